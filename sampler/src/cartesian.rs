use ndarray::Array3;
use crate::sampler::{grid_coord, kept_lines, Sampler};

/// One readout along x per kept (ky,kz) line, kz outermost
#[derive(Clone,Debug)]
pub struct Cartesian {
    dims:[usize;3],
    lines:Vec<(usize,usize)>,
}

impl Cartesian {
    pub fn new(dims:[usize;3],accel:usize) -> Self {
        let ky = kept_lines(dims[1],accel);
        let lines = (0..dims[2]).flat_map(|z| ky.iter().map(move |y| (*y,z))).collect();
        Self {
            dims,
            lines,
        }
    }
}

impl Sampler for Cartesian {

    fn name(&self) -> &str {
        "cartesian"
    }

    fn shots_per_frame(&self) -> usize {
        self.lines.len()
    }

    fn samples_per_shot(&self) -> usize {
        self.dims[0]
    }

    fn on_grid(&self) -> bool {
        true
    }

    fn frame(&self,_frame_idx:usize,_seed:u64) -> Array3<f32> {
        let [nx,ny,nz] = self.dims;
        Array3::from_shape_fn((self.lines.len(),nx,3),|(shot,i,axis)| {
            let (y,z) = self.lines[shot];
            match axis {
                0 => grid_coord(i,nx),
                1 => grid_coord(y,ny),
                _ => grid_coord(z,nz),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_sampling_visits_every_point_once() {
        let c = Cartesian::new([6,4,3],1);
        let f = c.frame(0,0);
        assert_eq!(f.shape(),&[12,6,3]);
        let points:HashSet<[i32;3]> = f.outer_iter()
            .flat_map(|shot| shot.outer_iter().map(|p| [p[0] as i32,p[1] as i32,p[2] as i32]).collect::<Vec<_>>())
            .collect();
        assert_eq!(points.len(),6*4*3);
        assert!(points.iter().all(|p| p[0] >= -3 && p[0] < 3 && p[1] >= -2 && p[1] < 2 && p[2] >= -1 && p[2] < 2));
    }

    #[test]
    fn acceleration_keeps_center_line() {
        let c = Cartesian::new([8,8,2],3);
        assert_eq!(c.shots_per_frame(),3*2);
        let f = c.frame(5,9);
        assert!(f.outer_iter().any(|shot| shot[[0,1]] == 0.0 && shot[[0,2]] == 0.0));
        // identical for every frame
        assert_eq!(f,c.frame(0,1));
    }
}
