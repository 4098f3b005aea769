use std::fmt::Debug;
use ndarray::{s, Array3};
use thiserror::Error;
use tracing::info;
use sim_conf::scenario::SamplerConfig;
use sim_conf::sim_conf::SimConfig;
use crate::cartesian::Cartesian;
use crate::evi::Evi;
use crate::plan::AcquisitionPlan;
use crate::spiral::StackOfSpiral;

#[derive(Debug,Error)]
pub enum SamplerError {
    #[error("frames of {frame_ms} ms do not fit in {max_sim_time} s of simulation")]
    NoFrames {
        frame_ms:f64,
        max_sim_time:f64,
    },
    #[error("no whole chunk of {chunk_size} shots fits in {n_shots} shots")]
    NoChunks {
        n_shots:usize,
        chunk_size:usize,
    },
    #[error("sampler produces empty shots")]
    EmptyShot,
}

/// Ordered trajectory of a whole run
#[derive(Clone,Debug)]
pub struct Trajectory {
    /// (shots, samples, 3) in cycles per fov
    pub points:Array3<f32>,
    /// acquisition time of each shot, seconds
    pub times_s:Vec<f64>,
}

impl Trajectory {
    pub fn n_shots(&self) -> usize {
        self.points.shape()[0]
    }

    pub fn n_samples(&self) -> usize {
        self.points.shape()[0] * self.points.shape()[1]
    }
}

/// k-space sampling pattern. Coordinates are in grid units (cycles per fov), within [-n/2,n/2) on
/// every axis.
pub trait Sampler: Debug + Send + Sync {

    fn name(&self) -> &str;

    fn shots_per_frame(&self) -> usize;

    fn samples_per_shot(&self) -> usize;

    /// every sample lands on an integer grid position
    fn on_grid(&self) -> bool;

    /// (shots, samples, 3) coordinates of one frame, deterministic in (frame_idx, seed)
    fn frame(&self,frame_idx:usize,seed:u64) -> Array3<f32>;

    fn produce_trajectory(&self,plan:&AcquisitionPlan,seed:u64) -> Trajectory {
        let mut points = Array3::<f32>::zeros((plan.n_shots(),self.samples_per_shot(),3));
        for frame in 0..plan.n_frames {
            let f = self.frame(frame,seed);
            let start = frame * plan.shots_per_frame;
            points.slice_mut(s![start..start + plan.shots_per_frame,..,..]).assign(&f);
        }
        Trajectory {
            points,
            times_s:(0..plan.n_shots()).map(|shot| plan.shot_time_s(shot)).collect(),
        }
    }
}

pub fn build_sampler(config:&SamplerConfig,sim:&SimConfig) -> Result<Box<dyn Sampler>,SamplerError> {
    let dims = sim.dims();
    let sampler:Box<dyn Sampler> = match config {
        SamplerConfig::Cartesian{accel} => Box::new(Cartesian::new(dims,*accel)),
        SamplerConfig::Evi{accel} => Box::new(Evi::new(dims,*accel)),
        SamplerConfig::StackOfSpiral{accelz,nb_revolutions,constant,n_samples} => {
            Box::new(StackOfSpiral::new(dims,*accelz,*nb_revolutions,*constant,*n_samples))
        }
    };
    if sampler.shots_per_frame() == 0 || sampler.samples_per_shot() == 0 {
        return Err(SamplerError::EmptyShot);
    }
    info!("{} sampler: {} shots of {} samples per frame",sampler.name(),sampler.shots_per_frame(),sampler.samples_per_shot());
    Ok(sampler)
}

/// grid coordinate of index i on an axis of n points, the center index maps to 0
pub fn grid_coord(i:usize,n:usize) -> f32 {
    i as f32 - (n/2) as f32
}

/// indices kept with an acceleration factor, the center line always among them
pub fn kept_lines(n:usize,accel:usize) -> Vec<usize> {
    let center = (n/2) as isize;
    let accel = accel.max(1) as isize;
    (0..n).filter(|i| (*i as isize - center).rem_euclid(accel) == 0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kept_lines_include_center() {
        assert_eq!(kept_lines(8,1),(0..8).collect::<Vec<usize>>());
        assert_eq!(kept_lines(8,2),vec![0,2,4,6]);
        assert_eq!(kept_lines(7,3),vec![0,3,6]);
        assert_eq!(kept_lines(8,100),vec![4]);
        assert_eq!(grid_coord(4,8),0.0);
        assert_eq!(grid_coord(0,8),-4.0);
    }

    #[test]
    fn builds_every_variant() {
        let mut sim = SimConfig::default();
        sim.shape = vec![8,8,4];
        let configs = [
            SamplerConfig::Cartesian{accel:2},
            SamplerConfig::Evi{accel:1},
            SamplerConfig::default(),
        ];
        let names:Vec<String> = configs.iter().map(|c| build_sampler(c,&sim).unwrap().name().to_string()).collect();
        assert_eq!(names,vec!["cartesian","evi","stack_of_spiral"]);
    }

    #[test]
    fn trajectory_covers_the_plan() {
        let mut sim = SimConfig::default();
        sim.shape = vec![8,8,4];
        sim.max_sim_time = 10.0;
        let sampler = build_sampler(&SamplerConfig::Cartesian{accel:1},&sim).unwrap();
        let plan = AcquisitionPlan::new(sampler.as_ref(),&sim,4).unwrap();
        let traj = sampler.produce_trajectory(&plan,1);
        assert_eq!(traj.n_shots(),plan.chunk_size * plan.n_chunks());
        assert_eq!(traj.n_samples(),plan.n_shots() * 8);
        assert_eq!(traj.times_s.len(),traj.n_shots());
        assert!(traj.times_s.windows(2).all(|w| w[1] > w[0]));
    }
}
