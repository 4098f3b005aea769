use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use crate::error::ConfigError;

/// Gradient recalled echo timing. TR and TE in ms, FA in degrees.
#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct GreConfig {
    #[serde(rename = "TR")]
    pub tr_ms:f64,
    #[serde(rename = "TE")]
    pub te_ms:f64,
    #[serde(rename = "FA")]
    pub fa_deg:f64,
}

impl Default for GreConfig {
    fn default() -> Self {
        Self {
            tr_ms: 50.0,
            te_ms: 30.0,
            fa_deg: 15.0,
        }
    }
}

impl GreConfig {
    pub fn validate(&self) -> Result<(),ConfigError> {
        if !(self.tr_ms > 0.0) || !(self.te_ms > 0.0) {
            return Err(ConfigError::invalid("sim_conf.seq","TR and TE must be positive"));
        }
        if self.te_ms >= self.tr_ms {
            return Err(ConfigError::invalid("sim_conf.seq.TE",format!("TE ({}) must be less than TR ({})",self.te_ms,self.tr_ms)));
        }
        if !(0.0..=180.0).contains(&self.fa_deg) {
            return Err(ConfigError::invalid("sim_conf.seq.FA","FA must be between 0 and 180 degrees"));
        }
        Ok(())
    }
}

#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub gmax:f64,
    pub smax:f64,
    pub n_coils:usize,
    pub dwell_time_ms:f64,
    pub raster_time_ms:f64,
    pub field:f64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            gmax: 40.0,
            smax: 200.0,
            n_coils: 8,
            dwell_time_ms: 1e-3,
            raster_time_ms: 5e-3,
            field: 3.0,
        }
    }
}

impl HardwareConfig {
    pub fn validate(&self) -> Result<(),ConfigError> {
        if self.n_coils == 0 {
            return Err(ConfigError::invalid("sim_conf.hardware.n_coils","at least one coil is required"));
        }
        if !(self.dwell_time_ms > 0.0) {
            return Err(ConfigError::invalid("sim_conf.hardware.dwell_time_ms","must be positive"));
        }
        Ok(())
    }
}

/// Base parameters of a simulation run. Read only once resolved.
#[derive(Clone,Debug,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// seconds
    pub max_sim_time:f64,
    pub seq:GreConfig,
    pub hardware:HardwareConfig,
    pub shape:Vec<usize>,
    pub fov_mm:Vec<f64>,
    pub rng_seed:u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_sim_time: 300.0,
            seq: GreConfig::default(),
            hardware: HardwareConfig::default(),
            shape: vec![192,192,128],
            fov_mm: vec![192.0,192.0,128.0],
            rng_seed: 19290506,
        }
    }
}

impl SimConfig {

    pub fn validate(&self) -> Result<(),ConfigError> {
        if self.shape.len() != 3 || self.fov_mm.len() != 3 {
            return Err(ConfigError::ShapeFovMismatch{shape:self.shape.clone(),fov_mm:self.fov_mm.clone()});
        }
        if self.shape.iter().any(|s| *s == 0) {
            return Err(ConfigError::invalid("sim_conf.shape","all dimensions must be non-zero"));
        }
        if self.fov_mm.iter().any(|f| !(*f > 0.0)) {
            return Err(ConfigError::invalid("sim_conf.fov_mm","all dimensions must be positive"));
        }
        if !(self.max_sim_time > 0.0) {
            return Err(ConfigError::invalid("sim_conf.max_sim_time","must be positive"));
        }
        self.seq.validate()?;
        self.hardware.validate()
    }

    /// matrix size. Only meaningful after validate
    pub fn dims(&self) -> [usize;3] {
        std::array::from_fn(|i| self.shape.get(i).copied().unwrap_or(1))
    }

    pub fn fov(&self) -> [f64;3] {
        std::array::from_fn(|i| self.fov_mm.get(i).copied().unwrap_or(1.0))
    }

    pub fn res_mm(&self) -> [f64;3] {
        let d = self.dims();
        let f = self.fov();
        std::array::from_fn(|i| f[i]/d[i] as f64)
    }

    pub fn n_voxels(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn sim_tr_ms(&self) -> f64 {
        self.seq.tr_ms
    }

    /// number of TRs that fit in the simulation time
    pub fn max_n_shots(&self) -> usize {
        (self.max_sim_time * 1000.0 / self.sim_tr_ms()).floor() as usize
    }
}

pub trait ConfigFile: Sized + Serialize + DeserializeOwned {

    fn file_ext() -> String;

    fn to_file(&self,filename:&Path) -> Result<PathBuf,ConfigError> {
        // through a value so plain keys are emitted before tables
        let t = toml::to_string_pretty(&toml::Value::try_from(self)?)?;
        let p = filename.with_extension(Self::file_ext());
        let mut f = File::create(&p)?;
        f.write_all(t.as_bytes())?;
        Ok(p)
    }

    fn from_file(filename:&Path) -> Result<Self,ConfigError> {
        let mut f = File::open(filename)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        Ok(toml::from_str(&s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = SimConfig::default();
        c.validate().unwrap();
        assert_eq!(c.dims(),[192,192,128]);
        assert_eq!(c.res_mm(),[1.0,1.0,1.0]);
        assert_eq!(c.max_n_shots(),6000);
    }

    #[test]
    fn shape_and_fov_must_be_3d() {
        let mut c = SimConfig::default();
        c.shape = vec![64,64];
        assert!(matches!(c.validate(),Err(ConfigError::ShapeFovMismatch{..})));
        let mut c = SimConfig::default();
        c.fov_mm = vec![1.0,1.0,1.0,1.0];
        assert!(matches!(c.validate(),Err(ConfigError::ShapeFovMismatch{..})));
    }

    #[test]
    fn sequence_timing_is_checked() {
        let mut c = SimConfig::default();
        c.seq.te_ms = 60.0;
        assert!(c.validate().is_err());
        c.seq.te_ms = 20.0;
        c.seq.fa_deg = 190.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn reads_uppercase_sequence_keys() {
        let c:SimConfig = toml::from_str("max_sim_time = 10\n[seq]\nTR = 20\nTE = 5\n").unwrap();
        assert_eq!(c.seq.tr_ms,20.0);
        assert_eq!(c.seq.te_ms,5.0);
        assert_eq!(c.seq.fa_deg,15.0);
        assert_eq!(c.max_n_shots(),500);
    }
}
