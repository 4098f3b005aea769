use ndarray::Array3;
use crate::sampler::{grid_coord, kept_lines, Sampler};

/// Echo volumar imaging: the whole volume in one shot, x readouts alternating direction line by
/// line.
#[derive(Clone,Debug)]
pub struct Evi {
    dims:[usize;3],
    lines:Vec<(usize,usize)>,
}

impl Evi {
    pub fn new(dims:[usize;3],accel:usize) -> Self {
        let ky = kept_lines(dims[1],accel);
        let lines = (0..dims[2]).flat_map(|z| ky.iter().map(move |y| (*y,z))).collect();
        Self {
            dims,
            lines,
        }
    }
}

impl Sampler for Evi {

    fn name(&self) -> &str {
        "evi"
    }

    fn shots_per_frame(&self) -> usize {
        1
    }

    fn samples_per_shot(&self) -> usize {
        self.dims[0] * self.lines.len()
    }

    fn on_grid(&self) -> bool {
        true
    }

    fn frame(&self,_frame_idx:usize,_seed:u64) -> Array3<f32> {
        let [nx,ny,nz] = self.dims;
        Array3::from_shape_fn((1,self.samples_per_shot(),3),|(_,sample,axis)| {
            let line = sample / nx;
            let (y,z) = self.lines[line];
            let x = match line % 2 {
                0 => sample % nx,
                _ => nx - 1 - sample % nx,
            };
            match axis {
                0 => grid_coord(x,nx),
                1 => grid_coord(y,ny),
                _ => grid_coord(z,nz),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readout_zig_zags() {
        let e = Evi::new([4,4,2],2);
        let f = e.frame(0,0);
        assert_eq!(f.shape(),&[1,4*2*2,3]);
        // first line runs forward, second backward
        let x:Vec<f32> = (0..8).map(|i| f[[0,i,0]]).collect();
        assert_eq!(x,vec![-2.0,-1.0,0.0,1.0,1.0,0.0,-1.0,-2.0]);
        // consecutive samples never jump in x by more than one step
        assert!((1..f.shape()[1]).all(|i| (f[[0,i,0]] - f[[0,i-1,0]]).abs() <= 1.0));
    }
}
