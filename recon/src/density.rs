use ndarray::{Array1, ArrayView2};
use num_complex::Complex32;
use tracing::debug;
use nufft::{NufftError, NufftOperator};
use sim_conf::scenario::DensityCompensation;

const EPS:f32 = 1e-6;

/// Sample density weights for a trajectory. Pipe-Menon iterates w <- w / |A A^H w| starting from
/// ones, which leaves uniform cartesian sampling at w = 1.
pub fn density_weights(method:&DensityCompensation,op:&dyn NufftOperator,traj:&ArrayView2<f32>) -> Result<Array1<f32>,NufftError> {
    let n = traj.nrows();
    let mut w = Array1::<f32>::ones(n);
    if let DensityCompensation::Pipe{n_iter} = method {
        for _ in 0..*n_iter {
            let wc = w.mapv(|x| Complex32::new(x,0.0));
            let grid = op.adjoint(&wc.view(),traj)?;
            let d = op.forward(&grid,traj)?;
            w.iter_mut().zip(d.iter()).for_each(|(wi,di)| *wi /= di.norm().max(EPS));
        }
        debug!("pipe density compensation over {} samples, {} iterations",n,n_iter);
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use nufft::Nudft;

    fn full_grid(dims:[usize;3]) -> Array2<f32> {
        let n = dims.iter().product();
        let mut traj = Array2::<f32>::zeros((n,3));
        let mut i = 0;
        for x in 0..dims[0] {
            for y in 0..dims[1] {
                for z in 0..dims[2] {
                    traj[[i,0]] = x as f32 - (dims[0]/2) as f32;
                    traj[[i,1]] = y as f32 - (dims[1]/2) as f32;
                    traj[[i,2]] = z as f32 - (dims[2]/2) as f32;
                    i += 1;
                }
            }
        }
        traj
    }

    #[test]
    fn no_compensation_is_uniform() {
        let op = Nudft::new([4,4,2]);
        let traj = full_grid([4,4,2]);
        let w = density_weights(&DensityCompensation::None,&op,&traj.view()).unwrap();
        assert!(w.iter().all(|&x| x == 1.0));
    }

    #[test]
    fn full_cartesian_sampling_keeps_unit_weights() {
        let op = Nudft::new([4,4,2]);
        let traj = full_grid([4,4,2]);
        let w = density_weights(&DensityCompensation::Pipe{n_iter:3},&op,&traj.view()).unwrap();
        w.iter().for_each(|&x| assert!((x - 1.0).abs() < 1e-3));
    }

    #[test]
    fn repeated_samples_are_down_weighted() {
        let op = Nudft::new([4,4,2]);
        let mut traj = full_grid([4,4,2]);
        // sample 1 taken twice
        let dup = traj.row(1).to_owned();
        traj.row_mut(0).assign(&dup);
        let w = density_weights(&DensityCompensation::Pipe{n_iter:1},&op,&traj.view()).unwrap();
        assert!(w[0] < 0.75 && w[1] < 0.75);
        assert!((w[5] - 1.0).abs() < 1e-3);
    }
}
