use std::ops::Range;
use tracing::{info, warn};
use sim_conf::sim_conf::SimConfig;
use crate::sampler::{Sampler, SamplerError};

/// Timeline of an acquisition: whole frames only, and a whole number of chunks.
#[derive(Clone,Debug,PartialEq)]
pub struct AcquisitionPlan {
    pub n_frames:usize,
    pub shots_per_frame:usize,
    pub samples_per_shot:usize,
    /// shots per chunk
    pub chunk_size:usize,
    pub tr_ms:f64,
    /// frames removed so that chunks tile the run
    pub dropped_frames:usize,
}

impl AcquisitionPlan {

    pub fn new(sampler:&dyn Sampler,sim:&SimConfig,chunk_size:usize) -> Result<Self,SamplerError> {
        let spf = sampler.shots_per_frame();
        let tr_ms = sim.sim_tr_ms();
        let frame_ms = spf as f64 * tr_ms;
        let raw = sim.max_sim_time * 1000.0 / frame_ms;
        let complete = (raw + 1e-9).floor() as usize;
        if complete == 0 {
            return Err(SamplerError::NoFrames{frame_ms,max_sim_time:sim.max_sim_time});
        }
        if raw - complete as f64 > 1e-9 {
            warn!("discarding incomplete frame at the end of the simulation ({:.3} frames fit)",raw);
        }
        let mut n_frames = complete;
        while n_frames > 0 && (n_frames * spf) % chunk_size.max(1) != 0 {
            n_frames -= 1;
        }
        if n_frames == 0 {
            return Err(SamplerError::NoChunks{n_shots:complete * spf,chunk_size});
        }
        let dropped_frames = complete - n_frames;
        if dropped_frames > 0 {
            warn!("dropping {} trailing frames to fit chunks of {} shots",dropped_frames,chunk_size);
        }
        let plan = Self {
            n_frames,
            shots_per_frame:spf,
            samples_per_shot:sampler.samples_per_shot(),
            chunk_size,
            tr_ms,
            dropped_frames,
        };
        info!("acquisition plan: {} frames, {} shots in {} chunks",plan.n_frames,plan.n_shots(),plan.n_chunks());
        Ok(plan)
    }

    pub fn n_shots(&self) -> usize {
        self.n_frames * self.shots_per_frame
    }

    pub fn n_chunks(&self) -> usize {
        self.n_shots() / self.chunk_size
    }

    pub fn n_samples(&self) -> usize {
        self.n_shots() * self.samples_per_shot
    }

    pub fn chunk_shots(&self,chunk:usize) -> Range<usize> {
        chunk * self.chunk_size..(chunk + 1) * self.chunk_size
    }

    pub fn frame_of(&self,shot:usize) -> usize {
        shot / self.shots_per_frame
    }

    pub fn shot_in_frame(&self,shot:usize) -> usize {
        shot % self.shots_per_frame
    }

    pub fn shot_time_s(&self,shot:usize) -> f64 {
        shot as f64 * self.tr_ms / 1000.0
    }

    /// onset of a frame, seconds
    pub fn frame_time_s(&self,frame:usize) -> f64 {
        self.shot_time_s(frame * self.shots_per_frame)
    }

    /// simulated duration, TR times the number of shots
    pub fn duration_s(&self) -> f64 {
        self.shot_time_s(self.n_shots())
    }
}
