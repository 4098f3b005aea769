use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;
use crate::sim_conf::{ConfigFile, SimConfig};

#[derive(Clone,Copy,Debug,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhantomKind {
    SheppLogan,
    Nifti,
}

impl PhantomKind {
    pub fn name(&self) -> &'static str {
        match self {
            PhantomKind::SheppLogan => "shepp_logan",
            PhantomKind::Nifti => "nifti",
        }
    }
}

#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct PhantomConfig {
    pub name:PhantomKind,
    pub sub_id:u32,
    /// label map for the nifti phantom
    pub path:Option<PathBuf>,
    /// tissue activated by the activation handlers
    pub roi_tissue:String,
    /// tissues replaced by background
    pub tissue_ignore:Vec<String>,
}

impl Default for PhantomConfig {
    fn default() -> Self {
        Self {
            name: PhantomKind::SheppLogan,
            sub_id: 0,
            path: None,
            roi_tissue: String::from("roi"),
            tissue_ignore: vec![],
        }
    }
}

#[derive(Clone,Copy,Debug,Default,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrfModel {
    #[default]
    None,
    Glover,
    Spm,
}

/// one stimulus. onset and duration in seconds
#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
pub struct EventConfig {
    pub onset:f64,
    pub duration:f64,
    #[serde(default = "one_f64")]
    pub amplitude:f64,
}

/// Handlers are applied in declaration order.
#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// on/off block design. Times in seconds, delta_r2s in 1/s
    BlockActivation {
        block_on:f64,
        block_off:f64,
        duration:f64,
        #[serde(default)]
        offset:f64,
        #[serde(default = "default_delta_r2s")]
        delta_r2s:f64,
        #[serde(default)]
        hrf:HrfModel,
    },
    EventActivation {
        events:Vec<EventConfig>,
        #[serde(default = "default_delta_r2s")]
        delta_r2s:f64,
        #[serde(default)]
        hrf:HrfModel,
    },
    /// complex gaussian noise on the image intensities. snr = 0 disables it
    ImageNoise {
        snr:f64,
    },
}

impl HandlerConfig {

    pub fn name(&self) -> &'static str {
        match self {
            HandlerConfig::BlockActivation{..} => "block_activation",
            HandlerConfig::EventActivation{..} => "event_activation",
            HandlerConfig::ImageNoise{..} => "image_noise",
        }
    }

    pub fn validate(&self) -> Result<(),ConfigError> {
        let non_negative = |field:&str,v:f64| match v >= 0.0 && v.is_finite() {
            true => Ok(()),
            false => Err(ConfigError::invalid(field,format!("{} must be a finite non-negative value",v)))
        };
        match self {
            HandlerConfig::BlockActivation{block_on,block_off,duration,offset,delta_r2s,..} => {
                non_negative("handlers.block_activation.block_off",*block_off)?;
                non_negative("handlers.block_activation.offset",*offset)?;
                non_negative("handlers.block_activation.duration",*duration)?;
                if !(*block_on > 0.0) || !block_on.is_finite() {
                    return Err(ConfigError::invalid("handlers.block_activation.block_on","must be positive"));
                }
                if !delta_r2s.is_finite() {
                    return Err(ConfigError::invalid("handlers.block_activation.delta_r2s","must be finite"));
                }
            }
            HandlerConfig::EventActivation{events,delta_r2s,..} => {
                for e in events {
                    non_negative("handlers.event_activation.events.onset",e.onset)?;
                    non_negative("handlers.event_activation.events.duration",e.duration)?;
                }
                if !delta_r2s.is_finite() {
                    return Err(ConfigError::invalid("handlers.event_activation.delta_r2s","must be finite"));
                }
            }
            HandlerConfig::ImageNoise{snr} => non_negative("handlers.image_noise.snr",*snr)?,
        }
        Ok(())
    }
}

#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplerConfig {
    /// readout along x, one shot per kept (ky,kz) line
    Cartesian {
        #[serde(default = "one_usize")]
        accel:usize,
    },
    /// one spiral interleaf per kept kz partition
    StackOfSpiral {
        #[serde(default = "one_usize")]
        accelz:usize,
        #[serde(default = "default_revolutions")]
        nb_revolutions:f64,
        #[serde(default)]
        constant:bool,
        /// points per spiral, defaults to 2 * nx * revolutions
        #[serde(default)]
        n_samples:Option<usize>,
    },
    /// echo volumar imaging, one shot per frame
    Evi {
        #[serde(default = "one_usize")]
        accel:usize,
    },
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig::StackOfSpiral {
            accelz: 1,
            nb_revolutions: default_revolutions(),
            constant: false,
            n_samples: None,
        }
    }
}

impl SamplerConfig {

    pub fn name(&self) -> &'static str {
        match self {
            SamplerConfig::Cartesian{..} => "cartesian",
            SamplerConfig::StackOfSpiral{..} => "stack_of_spiral",
            SamplerConfig::Evi{..} => "evi",
        }
    }

    /// true when every sample lands on the cartesian grid
    pub fn is_on_grid(&self) -> bool {
        !matches!(self,SamplerConfig::StackOfSpiral{..})
    }

    pub fn validate(&self) -> Result<(),ConfigError> {
        match self {
            SamplerConfig::Cartesian{accel} | SamplerConfig::Evi{accel} => {
                if *accel == 0 {
                    return Err(ConfigError::invalid("sampler.accel","acceleration must be at least 1"));
                }
            }
            SamplerConfig::StackOfSpiral{accelz,nb_revolutions,n_samples,..} => {
                if *accelz == 0 {
                    return Err(ConfigError::invalid("sampler.accelz","acceleration must be at least 1"));
                }
                if !(*nb_revolutions > 0.0) {
                    return Err(ConfigError::invalid("sampler.nb_revolutions","must be positive"));
                }
                if *n_samples == Some(0) {
                    return Err(ConfigError::invalid("sampler.n_samples","must be positive"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone,Copy,Debug,Default,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalModel {
    /// contrast evaluated at TE for the whole readout
    #[default]
    Simple,
    /// T2* decay along the readout
    T2s,
}

impl SignalModel {
    pub fn name(&self) -> &'static str {
        match self {
            SignalModel::Simple => "simple",
            SignalModel::T2s => "t2s",
        }
    }
    pub fn from_name(name:&str) -> Option<Self> {
        match name {
            "simple" => Some(SignalModel::Simple),
            "t2s" => Some(SignalModel::T2s),
            _ => None
        }
    }
}

#[derive(Clone,Copy,Debug,Default,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NufftBackend {
    /// exact non-uniform dft
    #[default]
    Nudft,
    /// cartesian fft, samples must be on the grid
    Fft,
}

impl NufftBackend {
    pub fn name(&self) -> &'static str {
        match self {
            NufftBackend::Nudft => "nudft",
            NufftBackend::Fft => "fft",
        }
    }
    pub fn from_name(name:&str) -> Option<Self> {
        match name {
            "nudft" => Some(NufftBackend::Nudft),
            "fft" => Some(NufftBackend::Fft),
            _ => None
        }
    }
}

#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub n_jobs:usize,
    /// shots per chunk
    pub chunk_size:usize,
    pub model:SignalModel,
    /// k-space snr, 0 disables noise
    pub snr:f64,
    pub nufft_backend:NufftBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            n_jobs: 1,
            chunk_size: 1,
            model: SignalModel::Simple,
            snr: 0.0,
            nufft_backend: NufftBackend::Nudft,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(),ConfigError> {
        if self.n_jobs == 0 {
            return Err(ConfigError::invalid("engine.n_jobs","at least one job is required"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("engine.chunk_size","must be at least 1"));
        }
        if !(self.snr >= 0.0) || !self.snr.is_finite() {
            return Err(ConfigError::invalid("engine.snr","must be a finite non-negative value"));
        }
        if self.model == SignalModel::T2s && self.nufft_backend != NufftBackend::Nudft {
            return Err(ConfigError::Unsupported(String::from("the t2s signal model requires the nudft backend")));
        }
        Ok(())
    }
}

#[derive(Clone,Debug,Default,PartialEq,Serialize,Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DensityCompensation {
    #[default]
    None,
    /// Pipe-Menon fixed point iterations
    Pipe {
        #[serde(default = "default_pipe_iter")]
        n_iter:usize,
    },
}

#[derive(Clone,Copy,Debug,Default,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStrategy {
    Cold,
    #[default]
    Warm,
    /// warm, with a larger budget on the first frame
    Refine,
}

#[derive(Clone,Copy,Debug,Default,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparsityBasis {
    #[default]
    None,
    Identity,
    Haar,
}

#[derive(Clone,Debug,Default,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct Regularization {
    pub basis:SparsityBasis,
    pub lambda:f64,
}

#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconstructorConfig {
    Adjoint {
        #[serde(default)]
        backend:NufftBackend,
        #[serde(default)]
        density_compensation:DensityCompensation,
    },
    Sequential {
        #[serde(default)]
        backend:NufftBackend,
        #[serde(default)]
        density_compensation:DensityCompensation,
        #[serde(default)]
        restart_strategy:RestartStrategy,
        #[serde(default = "default_iter_per_frame")]
        max_iter_per_frame:usize,
        #[serde(default = "default_iter_first_frame")]
        max_iter_first_frame:usize,
        #[serde(default = "default_tolerance")]
        tolerance:f64,
        #[serde(default)]
        regularization:Regularization,
    },
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        ReconstructorConfig::Adjoint {
            backend: NufftBackend::Nudft,
            density_compensation: DensityCompensation::None,
        }
    }
}

impl ReconstructorConfig {

    pub fn name(&self) -> &'static str {
        match self {
            ReconstructorConfig::Adjoint{..} => "adjoint",
            ReconstructorConfig::Sequential{..} => "sequential",
        }
    }

    pub fn backend(&self) -> NufftBackend {
        match self {
            ReconstructorConfig::Adjoint{backend,..} | ReconstructorConfig::Sequential{backend,..} => *backend
        }
    }

    pub fn validate(&self) -> Result<(),ConfigError> {
        if let ReconstructorConfig::Sequential{max_iter_per_frame,max_iter_first_frame,tolerance,regularization,..} = self {
            if *max_iter_per_frame == 0 || *max_iter_first_frame == 0 {
                return Err(ConfigError::invalid("reconstructors.max_iter_per_frame","iteration budget must be at least 1"));
            }
            if !(*tolerance >= 0.0) {
                return Err(ConfigError::invalid("reconstructors.tolerance","must be non-negative"));
            }
            if !(regularization.lambda >= 0.0) {
                return Err(ConfigError::invalid("reconstructors.regularization.lambda","must be non-negative"));
            }
        }
        Ok(())
    }
}

/// reconstructors listed on their own, as read by the recon tool
#[derive(Clone,Debug,Default,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct ReconstructorSet {
    pub reconstructors:Vec<ReconstructorConfig>,
}

impl ConfigFile for ReconstructorSet {
    fn file_ext() -> String {
        String::from("toml")
    }
}

/// Fully resolved configuration of one run.
#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name:String,
    /// output path, placeholders are filled by the acquisition engine
    pub output_template:String,
    pub sim_conf:SimConfig,
    pub phantom:PhantomConfig,
    pub handlers:Vec<HandlerConfig>,
    pub sampler:SamplerConfig,
    pub engine:EngineConfig,
    pub reconstructors:Vec<ReconstructorConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: String::from("scenario"),
            output_template: String::from("{name}_{sampler}_s{seed}.meas"),
            sim_conf: SimConfig::default(),
            phantom: PhantomConfig::default(),
            handlers: vec![],
            sampler: SamplerConfig::default(),
            engine: EngineConfig::default(),
            reconstructors: vec![ReconstructorConfig::default()],
        }
    }
}

impl ConfigFile for ScenarioConfig {
    fn file_ext() -> String {
        String::from("toml")
    }
}

impl ScenarioConfig {

    /// every check that must pass before any simulation work starts
    pub fn validate(&self) -> Result<(),ConfigError> {
        self.sim_conf.validate()?;
        if self.phantom.name == PhantomKind::Nifti && self.phantom.path.is_none() {
            return Err(ConfigError::invalid("phantom.path","the nifti phantom needs a label map path"));
        }
        for h in self.handlers.iter() {
            h.validate()?;
        }
        self.sampler.validate()?;
        self.engine.validate()?;
        if self.engine.nufft_backend == NufftBackend::Fft && !self.sampler.is_on_grid() {
            return Err(ConfigError::Unsupported(format!("the fft backend cannot simulate the off-grid {} sampler",self.sampler.name())));
        }
        for r in self.reconstructors.iter() {
            r.validate()?;
        }
        Ok(())
    }
}

fn one_usize() -> usize {1}
fn one_f64() -> f64 {1.0}
fn default_revolutions() -> f64 {10.0}
fn default_delta_r2s() -> f64 {-1.0}
fn default_pipe_iter() -> usize {10}
fn default_iter_per_frame() -> usize {15}
fn default_iter_first_frame() -> usize {50}
fn default_tolerance() -> f64 {1e-4}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scenario_is_valid() {
        ScenarioConfig::default().validate().unwrap();
    }

    #[test]
    fn tagged_variants_parse() {
        let s = r#"
            name = "block"
            [sim_conf]
            max_sim_time = 60
            shape = [8, 8, 4]
            fov_mm = [16.0, 16.0, 8.0]
            [[handlers]]
            kind = "block_activation"
            block_on = 20
            block_off = 20
            duration = 300
            hrf = "glover"
            [[handlers]]
            kind = "image_noise"
            snr = 100
            [sampler]
            kind = "evi"
            accel = 2
            [engine]
            n_jobs = 4
            nufft_backend = "fft"
            [[reconstructors]]
            kind = "sequential"
            restart_strategy = "cold"
            density_compensation = { method = "pipe", n_iter = 5 }
            regularization = { basis = "haar", lambda = 0.01 }
        "#;
        let c:ScenarioConfig = toml::from_str(s).unwrap();
        c.validate().unwrap();
        assert_eq!(c.handlers.len(),2);
        assert_eq!(c.handlers[0].name(),"block_activation");
        assert_eq!(c.handlers[1],HandlerConfig::ImageNoise{snr:100.0});
        assert_eq!(c.sampler,SamplerConfig::Evi{accel:2});
        match &c.reconstructors[0] {
            ReconstructorConfig::Sequential{restart_strategy,density_compensation,max_iter_per_frame,..} => {
                assert_eq!(*restart_strategy,RestartStrategy::Cold);
                assert_eq!(*density_compensation,DensityCompensation::Pipe{n_iter:5});
                assert_eq!(*max_iter_per_frame,15);
            }
            other => panic!("unexpected reconstructor {:?}",other),
        }
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let s = "[sampler]\nkind = \"radial\"\n";
        assert!(matches!(toml::from_str::<ScenarioConfig>(s),Err(_)));
        let s = "[[handlers]]\nkind = \"motion\"\n";
        assert!(toml::from_str::<ScenarioConfig>(s).is_err());
    }

    #[test]
    fn off_grid_sampler_needs_nudft() {
        let mut c = ScenarioConfig::default();
        c.engine.nufft_backend = NufftBackend::Fft;
        assert!(matches!(c.validate(),Err(ConfigError::Unsupported(_))));
        c.sampler = SamplerConfig::Cartesian{accel:1};
        c.validate().unwrap();
        c.engine.model = SignalModel::T2s;
        assert!(matches!(c.validate(),Err(ConfigError::Unsupported(_))));
    }

    #[test]
    fn negative_timing_is_rejected() {
        let mut c = ScenarioConfig::default();
        c.handlers.push(HandlerConfig::BlockActivation{block_on:-1.0,block_off:1.0,duration:10.0,offset:0.0,delta_r2s:-1.0,hrf:HrfModel::None});
        assert!(c.validate().is_err());
    }

    #[test]
    fn config_files_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = ScenarioConfig::default();
        c.reconstructors.push(ReconstructorConfig::Sequential {
            backend:NufftBackend::Nudft,
            density_compensation:DensityCompensation::Pipe{n_iter:3},
            restart_strategy:RestartStrategy::Refine,
            max_iter_per_frame:5,
            max_iter_first_frame:20,
            tolerance:1e-3,
            regularization:Regularization{basis:SparsityBasis::Haar,lambda:0.5},
        });
        let path = c.to_file(&dir.path().join("scenario")).unwrap();
        assert_eq!(path.extension().unwrap(),"toml");
        assert_eq!(ScenarioConfig::from_file(&path).unwrap(),c);
        // the reconstructor list can be taken from a scenario file
        let set = ReconstructorSet::from_file(&path).unwrap();
        assert_eq!(set.reconstructors,c.reconstructors);
    }
}
