use std::f64::consts::PI;
use ndarray::Array3;
use rand::seq::SliceRandom;
use utils::seeded_rng;
use crate::sampler::{grid_coord, Sampler};

/// rotation between consecutive partitions, radians
const GOLDEN_ANGLE:f64 = 2.399963229728653;

/// One archimedean spiral interleaf per kept kz partition
#[derive(Clone,Debug)]
pub struct StackOfSpiral {
    dims:[usize;3],
    accelz:usize,
    nb_revolutions:f64,
    /// constant linear velocity along the spiral
    constant:bool,
    n_samples:usize,
}

impl StackOfSpiral {

    pub fn new(dims:[usize;3],accelz:usize,nb_revolutions:f64,constant:bool,n_samples:Option<usize>) -> Self {
        let n_samples = n_samples.unwrap_or((2.0 * dims[0] as f64 * nb_revolutions).round() as usize);
        Self {
            dims,
            accelz:accelz.max(1),
            nb_revolutions,
            constant,
            n_samples,
        }
    }

    fn n_partitions(&self) -> usize {
        (self.dims[2] + self.accelz - 1)/self.accelz
    }

    /// partitions acquired in a frame. The center partition is always kept, the others are drawn
    /// from the frame seed when undersampling.
    pub fn partitions(&self,frame_idx:usize,seed:u64) -> Vec<usize> {
        let nz = self.dims[2];
        let center = nz/2;
        if self.accelz == 1 {
            return (0..nz).collect();
        }
        let mut rng = seeded_rng(seed,frame_idx as u64);
        let mut others:Vec<usize> = (0..nz).filter(|z| *z != center).collect();
        others.shuffle(&mut rng);
        let mut kept:Vec<usize> = others.into_iter().take(self.n_partitions() - 1).collect();
        kept.push(center);
        kept.sort_unstable();
        kept
    }
}

impl Sampler for StackOfSpiral {

    fn name(&self) -> &str {
        "stack_of_spiral"
    }

    fn shots_per_frame(&self) -> usize {
        self.n_partitions()
    }

    fn samples_per_shot(&self) -> usize {
        self.n_samples
    }

    fn on_grid(&self) -> bool {
        false
    }

    fn frame(&self,frame_idx:usize,seed:u64) -> Array3<f32> {
        let [nx,ny,nz] = self.dims;
        let partitions = self.partitions(frame_idx,seed);
        let n = self.n_samples;
        let kmax = [nx as f64/2.0,ny as f64/2.0];
        Array3::from_shape_fn((partitions.len(),n,3),|(shot,i,axis)| {
            let z = partitions[shot];
            let t = i as f64/n as f64;
            let r = match self.constant {
                true => t.sqrt(),
                false => t,
            };
            let theta = 2.0 * PI * self.nb_revolutions * r + GOLDEN_ANGLE * z as f64;
            match axis {
                0 => (kmax[0] * r * theta.cos()) as f32,
                1 => (kmax[1] * r * theta.sin()) as f32,
                _ => grid_coord(z,nz),
            }
        })
    }
}
