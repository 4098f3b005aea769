use std::f64::consts::PI;
use std::fmt::Debug;
use ndarray::{Array1, Array3, ArrayView1, ArrayView2, Zip};
use num_complex::Complex32;
use thiserror::Error;
use sim_conf::scenario::NufftBackend;
use utils::fft3;

/// distance to the nearest grid point still taken as on the grid
const GRID_TOLERANCE:f32 = 1e-3;

#[derive(Debug,Error)]
pub enum NufftError {
    #[error("sample {sample} at {coord:?} is not on the cartesian grid")]
    OffGrid {
        sample:usize,
        coord:[f32;3],
    },
    #[error("expected an image of shape {expected:?}, got {found:?}")]
    ShapeMismatch {
        expected:[usize;3],
        found:Vec<usize>,
    },
    #[error("trajectory has {traj} samples but data has {data}")]
    LengthMismatch {
        traj:usize,
        data:usize,
    },
}

/// Linear map between an image and k-space samples at trajectory positions given in grid units.
/// Both backends compute the same unitary transform
/// X(k) = 1/sqrt(N) sum_r x(r) exp(-2 pi i sum_d k_d (r_d - n_d/2)/n_d)
pub trait NufftOperator: Debug + Send + Sync {

    fn name(&self) -> &str;

    fn dims(&self) -> [usize;3];

    /// traj is (samples, 3)
    fn forward(&self,image:&Array3<Complex32>,traj:&ArrayView2<f32>) -> Result<Array1<Complex32>,NufftError>;

    fn adjoint(&self,data:&ArrayView1<Complex32>,traj:&ArrayView2<f32>) -> Result<Array3<Complex32>,NufftError>;

    fn check_image(&self,image:&Array3<Complex32>) -> Result<(),NufftError> {
        match image.shape() == self.dims() {
            true => Ok(()),
            false => Err(NufftError::ShapeMismatch{expected:self.dims(),found:image.shape().to_vec()})
        }
    }
}

pub fn build_operator(backend:NufftBackend,dims:[usize;3]) -> Box<dyn NufftOperator> {
    match backend {
        NufftBackend::Nudft => Box::new(Nudft::new(dims)),
        NufftBackend::Fft => Box::new(FftBackend::new(dims)),
    }
}

fn check_lengths(data:&ArrayView1<Complex32>,traj:&ArrayView2<f32>) -> Result<(),NufftError> {
    match data.len() == traj.nrows() {
        true => Ok(()),
        false => Err(NufftError::LengthMismatch{traj:traj.nrows(),data:data.len()})
    }
}

/// Exact non-uniform discrete fourier transform. Slow, any trajectory.
#[derive(Clone,Debug)]
pub struct Nudft {
    dims:[usize;3],
}

impl Nudft {

    pub fn new(dims:[usize;3]) -> Self {
        Self {
            dims
        }
    }

    /// exp(-2 pi i k (r - n/2)/n) for every r of one axis
    fn axis_phases(k:f32,n:usize) -> Vec<Complex32> {
        let c = (n/2) as f64;
        (0..n).map(|r| {
            let phi = -2.0 * PI * k as f64 * (r as f64 - c) / n as f64;
            Complex32::new(phi.cos() as f32,phi.sin() as f32)
        }).collect()
    }

    /// a single k-space sample
    pub fn sample(&self,image:&Array3<Complex32>,k:[f32;3]) -> Complex32 {
        let [nx,ny,nz] = self.dims;
        let px = Self::axis_phases(k[0],nx);
        let py = Self::axis_phases(k[1],ny);
        let pz = Self::axis_phases(k[2],nz);
        let norm = ((nx*ny*nz) as f32).sqrt();
        let mut acc = Complex32::new(0.0,0.0);
        for (x,plane) in image.outer_iter().enumerate() {
            let mut acc_y = Complex32::new(0.0,0.0);
            for (y,line) in plane.outer_iter().enumerate() {
                let acc_z:Complex32 = line.iter().zip(pz.iter()).map(|(v,p)| v * p).sum();
                acc_y += acc_z * py[y];
            }
            acc += acc_y * px[x];
        }
        acc / norm
    }
}

impl NufftOperator for Nudft {

    fn name(&self) -> &str {
        "nudft"
    }

    fn dims(&self) -> [usize;3] {
        self.dims
    }

    fn forward(&self,image:&Array3<Complex32>,traj:&ArrayView2<f32>) -> Result<Array1<Complex32>,NufftError> {
        self.check_image(image)?;
        Ok(traj.outer_iter().map(|k| self.sample(image,[k[0],k[1],k[2]])).collect())
    }

    fn adjoint(&self,data:&ArrayView1<Complex32>,traj:&ArrayView2<f32>) -> Result<Array3<Complex32>,NufftError> {
        check_lengths(data,traj)?;
        let [nx,ny,nz] = self.dims;
        let norm = ((nx*ny*nz) as f32).sqrt();
        let mut image = Array3::<Complex32>::zeros((nx,ny,nz));
        for (k,d) in traj.outer_iter().zip(data.iter()) {
            let px = Self::axis_phases(k[0],nx);
            let py = Self::axis_phases(k[1],ny);
            let pz = Self::axis_phases(k[2],nz);
            let d = d / norm;
            image.indexed_iter_mut().for_each(|((x,y,z),v)| {
                *v += d * (px[x] * py[y] * pz[z]).conj();
            });
        }
        Ok(image)
    }
}

/// Cartesian fft, only for trajectories on the integer grid
#[derive(Clone,Debug)]
pub struct FftBackend {
    dims:[usize;3],
}

impl FftBackend {

    pub fn new(dims:[usize;3]) -> Self {
        Self {
            dims
        }
    }

    /// fft index of a sample and the phase moving the origin to the volume center
    fn locate(&self,sample:usize,k:&ArrayView1<f32>) -> Result<([usize;3],Complex32),NufftError> {
        let mut index = [0usize;3];
        let mut phi = 0.0f64;
        for d in 0..3 {
            let n = self.dims[d];
            let r = k[d].round();
            if (k[d] - r).abs() > GRID_TOLERANCE {
                return Err(NufftError::OffGrid{sample,coord:[k[0],k[1],k[2]]});
            }
            let ki = r as i64;
            index[d] = ki.rem_euclid(n as i64) as usize;
            phi += 2.0 * PI * ki as f64 * (n/2) as f64 / n as f64;
        }
        Ok((index,Complex32::new(phi.cos() as f32,phi.sin() as f32)))
    }
}

impl NufftOperator for FftBackend {

    fn name(&self) -> &str {
        "fft"
    }

    fn dims(&self) -> [usize;3] {
        self.dims
    }

    fn forward(&self,image:&Array3<Complex32>,traj:&ArrayView2<f32>) -> Result<Array1<Complex32>,NufftError> {
        self.check_image(image)?;
        let mut ksp = image.clone();
        fft3(&mut ksp,false);
        let mut out = Array1::<Complex32>::zeros(traj.nrows());
        for (i,(k,o)) in traj.outer_iter().zip(out.iter_mut()).enumerate() {
            let (idx,phase) = self.locate(i,&k)?;
            *o = ksp[idx] * phase;
        }
        Ok(out)
    }

    fn adjoint(&self,data:&ArrayView1<Complex32>,traj:&ArrayView2<f32>) -> Result<Array3<Complex32>,NufftError> {
        check_lengths(data,traj)?;
        let mut grid = Array3::<Complex32>::zeros(self.dims);
        for (i,(k,d)) in traj.outer_iter().zip(data.iter()).enumerate() {
            let (idx,phase) = self.locate(i,&k)?;
            grid[idx] += d * phase.conj();
        }
        fft3(&mut grid,true);
        Ok(grid)
    }
}

/// <a,b> over two volumes
pub fn inner(a:&Array3<Complex32>,b:&Array3<Complex32>) -> Complex32 {
    let mut acc = Complex32::new(0.0,0.0);
    Zip::from(a).and(b).for_each(|a,b| acc += a.conj() * b);
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn test_image(dims:[usize;3]) -> Array3<Complex32> {
        Array3::from_shape_fn(dims,|(x,y,z)| Complex32::new((x + 2*y) as f32 * 0.1,z as f32 - 0.5 * y as f32))
    }

    fn full_grid(dims:[usize;3]) -> Array2<f32> {
        let n = dims.iter().product();
        Array2::from_shape_fn((n,3),|(i,d)| {
            let idx = [i / (dims[1]*dims[2]),(i / dims[2]) % dims[1],i % dims[2]];
            idx[d] as f32 - (dims[d]/2) as f32
        })
    }

    #[test]
    fn backends_agree_on_the_grid() {
        let dims = [4,3,2];
        let img = test_image(dims);
        let traj = full_grid(dims);
        let a = Nudft::new(dims).forward(&img,&traj.view()).unwrap();
        let b = FftBackend::new(dims).forward(&img,&traj.view()).unwrap();
        a.iter().zip(b.iter()).for_each(|(a,b)| assert!((a - b).norm() < 1e-4));
    }

    #[test]
    fn fully_sampled_adjoint_inverts_forward() {
        let dims = [4,4,2];
        let img = test_image(dims);
        let traj = full_grid(dims);
        for op in [build_operator(NufftBackend::Nudft,dims),build_operator(NufftBackend::Fft,dims)] {
            let k = op.forward(&img,&traj.view()).unwrap();
            let back = op.adjoint(&k.view(),&traj.view()).unwrap();
            back.iter().zip(img.iter()).for_each(|(a,b)| assert!((a - b).norm() < 1e-4));
        }
    }

    #[test]
    fn adjoint_is_the_adjoint() {
        let dims = [4,4,3];
        let img = test_image(dims);
        let traj = Array2::from_shape_fn((7,3),|(i,d)| (i as f32 * 0.37 + d as f32 * 0.61).sin() * 1.9);
        let y = Array1::from_shape_fn(7,|i| Complex32::new(i as f32 * 0.3,1.0 - i as f32 * 0.2));
        let op = Nudft::new(dims);
        let ax = op.forward(&img,&traj.view()).unwrap();
        let ahy = op.adjoint(&y.view(),&traj.view()).unwrap();
        let lhs:Complex32 = ax.iter().zip(y.iter()).map(|(a,b)| a.conj() * b).sum();
        let rhs = inner(&img,&ahy);
        assert!((lhs - rhs).norm() < 1e-3);
    }

    #[test]
    fn fft_backend_refuses_off_grid_samples() {
        let dims = [4,4,2];
        let traj = Array2::from_shape_vec((1,3),vec![0.5,0.0,0.0]).unwrap();
        let r = FftBackend::new(dims).forward(&test_image(dims),&traj.view());
        assert!(matches!(r,Err(NufftError::OffGrid{sample:0,..})));
        let wrong = Array3::<Complex32>::zeros((2,2,2));
        assert!(matches!(Nudft::new(dims).forward(&wrong,&traj.view()),Err(NufftError::ShapeMismatch{..})));
    }
}
