use std::fmt::Debug;
use std::path::Path;
use std::time::Instant;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView2, Zip};
use num_complex::Complex32;
use thiserror::Error;
use tracing::{debug, info, warn};
use headfile::headfile::HeadfileError;
use mr_data::cfl::CflError;
use mr_data::measurement::{FrameData, MeasurementError, MeasurementReader};
use nufft::{build_operator, coil_combine, coil_image, NufftError, NufftOperator};
use sim_conf::error::ConfigError;
use sim_conf::scenario::{DensityCompensation, NufftBackend, ReconstructorConfig, Regularization, RestartStrategy, SparsityBasis};
use utils::norm_sqr;
use crate::analysis::AnalysisError;
use crate::density::density_weights;
use crate::haar::{haar3, ihaar3};

/// iterations used to estimate the largest eigenvalue of the normal operator
const POWER_ITERATIONS:usize = 20;
/// head room on the estimated lipschitz constant
const LIPSCHITZ_MARGIN:f32 = 1.05;
const EPS:f32 = 1e-12;

#[derive(Debug,Error)]
pub enum ReconError {
    #[error("recon io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
    #[error(transparent)]
    Nufft(#[from] NufftError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cfl(#[from] CflError),
    #[error(transparent)]
    Headfile(#[from] HeadfileError),
    #[error("sensitivity maps have shape {found:?}, expected {expected:?}")]
    Maps {
        expected:Vec<usize>,
        found:Vec<usize>,
    },
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("frame {frame} has data for {found} coils, expected {expected}")]
    CoilMismatch {
        frame:usize,
        expected:usize,
        found:usize,
    },
}

#[derive(Clone,Debug,PartialEq)]
pub struct FrameDiagnostics {
    pub frame:usize,
    pub iterations:usize,
    pub converged:bool,
    /// last relative change of the estimate
    pub relative_change:f32,
}

#[derive(Clone,Debug)]
pub struct ReconOutput {
    pub reconstructor:String,
    pub volumes:Vec<Array3<Complex32>>,
    pub diagnostics:Vec<FrameDiagnostics>,
}

impl ReconOutput {
    pub fn n_converged(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.converged).count()
    }
}

/// Turns the k-space of one frame into an image. Called with frames in acquisition order.
pub trait Reconstructor: Debug {
    fn name(&self) -> &str;
    fn reconstruct_frame(&mut self,frame:&FrameData) -> Result<(Array3<Complex32>,FrameDiagnostics),ReconError>;
}

/// Multi-coil encoding E x = (A S_c x)_c, weighted by the sample density on the way back.
#[derive(Debug)]
struct Encoding {
    op:Box<dyn NufftOperator>,
    maps:Array4<Complex32>,
}

impl Encoding {

    fn new(backend:NufftBackend,maps:Array4<Complex32>) -> Self {
        let s = maps.shape();
        let dims = [s[1],s[2],s[3]];
        Self {
            op:build_operator(backend,dims),
            maps,
        }
    }

    fn n_coils(&self) -> usize {
        self.maps.shape()[0]
    }

    fn check(&self,frame:&FrameData) -> Result<(),ReconError> {
        if frame.kspace.nrows() != self.n_coils() {
            return Err(ReconError::CoilMismatch{frame:frame.frame,expected:self.n_coils(),found:frame.kspace.nrows()});
        }
        if frame.kspace.ncols() != frame.traj.nrows() {
            return Err(NufftError::LengthMismatch{traj:frame.traj.nrows(),data:frame.kspace.ncols()}.into());
        }
        Ok(())
    }

    /// (coils, samples)
    fn forward(&self,image:&Array3<Complex32>,traj:&ArrayView2<f32>) -> Result<Array2<Complex32>,NufftError> {
        let mut out = Array2::<Complex32>::zeros((self.n_coils(),traj.nrows()));
        for c in 0..self.n_coils() {
            let k = self.op.forward(&coil_image(image,&self.maps,c),traj)?;
            out.row_mut(c).assign(&k);
        }
        Ok(out)
    }

    /// sum_c conj(S_c) A^H (w y_c)
    fn adjoint(&self,data:&Array2<Complex32>,traj:&ArrayView2<f32>,weights:&Array1<f32>) -> Result<Array3<Complex32>,NufftError> {
        let coil_images = data.outer_iter().map(|y| {
            let wy = Zip::from(&y).and(weights).map_collect(|yi,wi| *yi * *wi);
            self.op.adjoint(&wy.view(),traj)
        }).collect::<Result<Vec<_>,_>>()?;
        Ok(coil_combine(&coil_images,&self.maps))
    }

    fn normal(&self,image:&Array3<Complex32>,traj:&ArrayView2<f32>,weights:&Array1<f32>) -> Result<Array3<Complex32>,NufftError> {
        let y = self.forward(image,traj)?;
        self.adjoint(&y,traj,weights)
    }

    /// largest eigenvalue of E^H W E by power iteration
    fn lipschitz(&self,traj:&ArrayView2<f32>,weights:&Array1<f32>) -> Result<f32,NufftError> {
        let dims = self.op.dims();
        let n:usize = dims.iter().product();
        let mut v = Array3::from_elem(dims,Complex32::new(1.0/(n as f32).sqrt(),0.0));
        let mut l = 0.0;
        for _ in 0..POWER_ITERATIONS {
            let nv = self.normal(&v,traj,weights)?;
            l = (norm_sqr(&nv) as f32).sqrt();
            if l <= EPS {
                break;
            }
            v = nv.mapv(|x| x / l);
        }
        Ok(match l > EPS {
            true => l * LIPSCHITZ_MARGIN,
            false => 1.0
        })
    }
}

/// per-trajectory quantities, recomputed only when the trajectory changes
#[derive(Debug)]
struct Prepared {
    traj:Array2<f32>,
    weights:Array1<f32>,
    lipschitz:f32,
}

fn prepare<'a>(cache:&'a mut Option<Prepared>,encoding:&Encoding,density:&DensityCompensation,traj:&Array2<f32>,with_lipschitz:bool) -> Result<&'a Prepared,NufftError> {
    let fresh = match cache.take() {
        Some(p) if p.traj == *traj => p,
        _ => {
            let weights = density_weights(density,encoding.op.as_ref(),&traj.view())?;
            let lipschitz = match with_lipschitz {
                true => encoding.lipschitz(&traj.view(),&weights)?,
                false => 1.0
            };
            debug!("prepared trajectory of {} samples, lipschitz constant {}",traj.nrows(),lipschitz);
            Prepared{traj:traj.clone(),weights,lipschitz}
        }
    };
    Ok(cache.insert(fresh))
}

fn soft_threshold(v:Complex32,thresh:f32) -> Complex32 {
    let m = v.norm();
    match m > thresh {
        true => v * ((m - thresh)/m),
        false => Complex32::new(0.0,0.0)
    }
}

/// proximal step of lambda * ||Psi x||_1
pub fn prox(x:Array3<Complex32>,reg:&Regularization,step:f32) -> Array3<Complex32> {
    let thresh = reg.lambda as f32 * step;
    if thresh <= 0.0 {
        return x;
    }
    match reg.basis {
        SparsityBasis::None => x,
        SparsityBasis::Identity => x.mapv(|v| soft_threshold(v,thresh)),
        SparsityBasis::Haar => ihaar3(&haar3(&x).mapv(|v| soft_threshold(v,thresh))),
    }
}

/// Density compensated adjoint. One pass, nothing carried between frames.
#[derive(Debug)]
pub struct AdjointReconstructor {
    encoding:Encoding,
    density:DensityCompensation,
    cache:Option<Prepared>,
}

impl Reconstructor for AdjointReconstructor {

    fn name(&self) -> &str {
        "adjoint"
    }

    fn reconstruct_frame(&mut self,frame:&FrameData) -> Result<(Array3<Complex32>,FrameDiagnostics),ReconError> {
        self.encoding.check(frame)?;
        let prepared = prepare(&mut self.cache,&self.encoding,&self.density,&frame.traj,false)?;
        let image = self.encoding.adjoint(&frame.kspace,&frame.traj.view(),&prepared.weights)?;
        let diagnostics = FrameDiagnostics {
            frame:frame.frame,
            iterations:0,
            converged:true,
            relative_change:0.0,
        };
        Ok((image,diagnostics))
    }
}

/// FISTA on ||E x - y||_W^2 + lambda ||Psi x||_1, frame after frame. The estimate of the last
/// frame is kept as the starting point of the next one unless the restart strategy is cold.
#[derive(Debug)]
pub struct SequentialReconstructor {
    encoding:Encoding,
    density:DensityCompensation,
    restart:RestartStrategy,
    max_iter_per_frame:usize,
    max_iter_first_frame:usize,
    tolerance:f32,
    regularization:Regularization,
    cache:Option<Prepared>,
    estimate:Option<Array3<Complex32>>,
    frames_done:usize,
}

impl SequentialReconstructor {

    fn budget(&self) -> usize {
        match (self.restart,self.frames_done) {
            (RestartStrategy::Refine,0) => self.max_iter_first_frame,
            _ => self.max_iter_per_frame
        }
    }

    fn initial_estimate(&self) -> Array3<Complex32> {
        match (self.restart,&self.estimate) {
            (RestartStrategy::Warm,Some(x)) | (RestartStrategy::Refine,Some(x)) => x.clone(),
            _ => Array3::zeros(self.encoding.op.dims())
        }
    }

    /// estimate carried into the next frame
    pub fn estimate(&self) -> Option<&Array3<Complex32>> {
        self.estimate.as_ref()
    }
}

impl Reconstructor for SequentialReconstructor {

    fn name(&self) -> &str {
        "sequential"
    }

    fn reconstruct_frame(&mut self,frame:&FrameData) -> Result<(Array3<Complex32>,FrameDiagnostics),ReconError> {
        self.encoding.check(frame)?;
        let budget = self.budget();
        let mut x = self.initial_estimate();
        let prepared = prepare(&mut self.cache,&self.encoding,&self.density,&frame.traj,true)?;
        let traj = frame.traj.view();
        let step = 1.0/prepared.lipschitz;

        let mut z = x.clone();
        let mut t = 1.0f32;
        let mut relative_change = f32::INFINITY;
        let mut iterations = 0;
        let mut converged = false;
        while iterations < budget {
            iterations += 1;
            let residual = self.encoding.forward(&z,&traj)? - &frame.kspace;
            let grad = self.encoding.adjoint(&residual,&traj,&prepared.weights)?;
            let x_new = prox(&z - &(grad * step),&self.regularization,step);

            let delta = &x_new - &x;
            let scale = (norm_sqr(&x_new) as f32).sqrt().max(EPS);
            relative_change = (norm_sqr(&delta) as f32).sqrt()/scale;

            let t_new = (1.0 + (1.0 + 4.0*t*t).sqrt())/2.0;
            z = &x_new + &(delta * ((t - 1.0)/t_new));
            x = x_new;
            t = t_new;
            if relative_change < self.tolerance {
                converged = true;
                break;
            }
        }
        self.estimate = Some(x.clone());
        self.frames_done += 1;
        let diagnostics = FrameDiagnostics {
            frame:frame.frame,
            iterations,
            converged,
            relative_change,
        };
        Ok((x,diagnostics))
    }
}

/// reconstructor for the given maps, (coils, x, y, z)
pub fn build_reconstructor(config:&ReconstructorConfig,maps:Array4<Complex32>) -> Result<Box<dyn Reconstructor>,ReconError> {
    config.validate()?;
    Ok(match config {
        ReconstructorConfig::Adjoint{backend,density_compensation} => Box::new(AdjointReconstructor {
            encoding:Encoding::new(*backend,maps),
            density:density_compensation.clone(),
            cache:None,
        }),
        ReconstructorConfig::Sequential{backend,density_compensation,restart_strategy,max_iter_per_frame,max_iter_first_frame,tolerance,regularization} => Box::new(SequentialReconstructor {
            encoding:Encoding::new(*backend,maps),
            density:density_compensation.clone(),
            restart:*restart_strategy,
            max_iter_per_frame:*max_iter_per_frame,
            max_iter_first_frame:*max_iter_first_frame,
            tolerance:*tolerance as f32,
            regularization:regularization.clone(),
            cache:None,
            estimate:None,
            frames_done:0,
        }),
    })
}

/// Reconstruct every frame of a complete measurement file, in order. Frames that miss the
/// tolerance are reported in the diagnostics, not treated as errors.
pub fn reconstruct(path:&Path,config:&ReconstructorConfig) -> Result<ReconOutput,ReconError> {
    config.validate()?;
    let mut reader = MeasurementReader::open(path)?;
    let dims = *reader.dims();
    let maps = reader.smaps()?;
    let expected = vec![dims.n_coils,dims.matrix[0],dims.matrix[1],dims.matrix[2]];
    if maps.shape() != expected.as_slice() {
        return Err(ReconError::Maps{expected,found:maps.shape().to_vec()});
    }
    let mut reconstructor = build_reconstructor(config,maps)?;
    info!("{} reconstruction of {} frames from {:?}",reconstructor.name(),dims.n_frames,path);
    let start = Instant::now();
    let mut volumes = Vec::with_capacity(dims.n_frames);
    let mut diagnostics = Vec::with_capacity(dims.n_frames);
    for frame in reader.frames() {
        let frame = frame?;
        let (vol,diag) = reconstructor.reconstruct_frame(&frame)?;
        match diag.converged {
            true => debug!("frame {} done after {} iterations",diag.frame,diag.iterations),
            false => warn!("frame {} did not converge in {} iterations, relative change {:.3e}",diag.frame,diag.iterations,diag.relative_change),
        }
        volumes.push(vol);
        diagnostics.push(diag);
    }
    info!("reconstruction took {:.2?}",start.elapsed());
    Ok(ReconOutput {
        reconstructor:reconstructor.name().to_string(),
        volumes,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nufft::smaps;

    const DIMS:[usize;3] = [4,4,2];

    fn full_grid() -> Array2<f32> {
        let n = DIMS.iter().product();
        let mut traj = Array2::<f32>::zeros((n,3));
        let mut i = 0;
        for z in 0..DIMS[2] {
            for y in 0..DIMS[1] {
                for x in 0..DIMS[0] {
                    traj[[i,0]] = x as f32 - (DIMS[0]/2) as f32;
                    traj[[i,1]] = y as f32 - (DIMS[1]/2) as f32;
                    traj[[i,2]] = z as f32 - (DIMS[2]/2) as f32;
                    i += 1;
                }
            }
        }
        traj
    }

    fn image() -> Array3<Complex32> {
        Array3::from_shape_fn(DIMS,|(x,y,z)| Complex32::new(1.0 + (x + 2*y) as f32 * 0.25,0.1 * z as f32))
    }

    fn frame(index:usize,n_coils:usize) -> FrameData {
        let encoding = Encoding::new(NufftBackend::Nudft,smaps(DIMS,n_coils));
        let traj = full_grid();
        let kspace = encoding.forward(&image(),&traj.view()).unwrap();
        FrameData{frame:index,traj,kspace}
    }

    fn sequential(restart:RestartStrategy,tolerance:f64) -> ReconstructorConfig {
        ReconstructorConfig::Sequential {
            backend:NufftBackend::Nudft,
            density_compensation:DensityCompensation::None,
            restart_strategy:restart,
            max_iter_per_frame:30,
            max_iter_first_frame:60,
            tolerance,
            regularization:Regularization{basis:SparsityBasis::Identity,lambda:1e-4},
        }
    }

    #[test]
    fn adjoint_of_full_sampling_is_the_image() {
        let mut r = build_reconstructor(&ReconstructorConfig::default(),smaps(DIMS,3)).unwrap();
        let (vol,diag) = r.reconstruct_frame(&frame(0,3)).unwrap();
        assert_eq!(diag.iterations,0);
        assert!(diag.converged);
        vol.iter().zip(image().iter()).for_each(|(a,b)| assert!((a - b).norm() < 1e-3));
    }

    #[test]
    fn sequential_converges_to_the_image() {
        let mut r = build_reconstructor(&sequential(RestartStrategy::Cold,1e-4),smaps(DIMS,2)).unwrap();
        let (vol,diag) = r.reconstruct_frame(&frame(0,2)).unwrap();
        assert!(diag.converged);
        assert!(diag.iterations > 1);
        vol.iter().zip(image().iter()).for_each(|(a,b)| assert!((a - b).norm() < 1e-2));
    }

    #[test]
    fn warm_start_needs_no_more_iterations_than_cold() {
        let mut cold = build_reconstructor(&sequential(RestartStrategy::Cold,1e-4),smaps(DIMS,2)).unwrap();
        let mut warm = build_reconstructor(&sequential(RestartStrategy::Warm,1e-4),smaps(DIMS,2)).unwrap();
        let mut n_cold = 0;
        let mut n_warm = 0;
        for i in 0..3 {
            let f = frame(i,2);
            n_cold += cold.reconstruct_frame(&f).unwrap().1.iterations;
            n_warm += warm.reconstruct_frame(&f).unwrap().1.iterations;
        }
        assert!(n_warm <= n_cold);
    }

    #[test]
    fn refine_spends_the_first_frame_budget_once() {
        let mut r = build_reconstructor(&sequential(RestartStrategy::Refine,0.0),smaps(DIMS,1)).unwrap();
        let (_,first) = r.reconstruct_frame(&frame(0,1)).unwrap();
        let (_,second) = r.reconstruct_frame(&frame(1,1)).unwrap();
        assert_eq!(first.iterations,60);
        assert_eq!(second.iterations,30);
        assert!(!first.converged);
        assert_eq!(second.frame,1);
    }

    #[test]
    fn coil_count_must_match_the_maps() {
        let mut r = build_reconstructor(&ReconstructorConfig::default(),smaps(DIMS,2)).unwrap();
        assert!(matches!(r.reconstruct_frame(&frame(0,3)),Err(ReconError::CoilMismatch{expected:2,found:3,..})));
    }

    #[test]
    fn soft_threshold_shrinks_towards_zero() {
        let reg = Regularization{basis:SparsityBasis::Identity,lambda:1.0};
        let x = Array3::from_shape_vec((1,1,3),vec![
            Complex32::new(3.0,4.0),Complex32::new(0.5,0.0),Complex32::new(0.0,-2.0)
        ]).unwrap();
        let y = prox(x.clone(),&reg,1.0);
        assert!((y[[0,0,0]] - Complex32::new(2.4,3.2)).norm() < 1e-5);
        assert_eq!(y[[0,0,1]],Complex32::new(0.0,0.0));
        assert!((y[[0,0,2]] - Complex32::new(0.0,-1.0)).norm() < 1e-5);
        let none = Regularization{basis:SparsityBasis::None,lambda:1.0};
        assert_eq!(prox(x.clone(),&none,1.0),x);
    }

    #[test]
    fn trajectory_quantities_are_cached() {
        let encoding = Encoding::new(NufftBackend::Nudft,smaps(DIMS,2));
        let traj = full_grid();
        let mut cache = None;
        let l = prepare(&mut cache,&encoding,&DensityCompensation::None,&traj,true).unwrap().lipschitz;
        // full sampling with normalized maps: E^H E = I
        assert!((l - LIPSCHITZ_MARGIN).abs() < 1e-3);
        let again = prepare(&mut cache,&encoding,&DensityCompensation::None,&traj,true).unwrap();
        assert_eq!(again.lipschitz,l);
    }
}
