use phantom::{FrameState, Phantom};
use sim_conf::sim_conf::SimConfig;
use tracing::debug;
use utils::{complex_gaussian, mean_signal, mix_seed, seeded_rng};
use crate::handler::{Handler, HandlerError, TimePoint};

/// Complex gaussian noise in image space, fresh for every frame
#[derive(Clone,Debug)]
pub struct ImageNoiseHandler {
    snr:f64,
    sigma:f32,
    seed:u64,
}

impl ImageNoiseHandler {

    /// sigma is taken from the mean signal of the unperturbed phantom at TE
    pub fn new(snr:f64,index:usize,phantom:&Phantom,sim:&SimConfig) -> Self {
        let sigma = match snr > 0.0 {
            true => {
                let reference = FrameState::from_phantom(phantom).image_at(&sim.seq,sim.seq.te_ms);
                (mean_signal(&reference) as f64 / snr) as f32
            }
            false => 0.0
        };
        debug!("image noise {}: snr {} sigma {}",index,snr,sigma);
        Self {
            snr,
            sigma,
            seed:mix_seed(sim.rng_seed,index as u64),
        }
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }
}

impl Handler for ImageNoiseHandler {

    fn name(&self) -> &str {
        "image_noise"
    }

    fn apply(&self,state:&mut FrameState,t:TimePoint) -> Result<(),HandlerError> {
        if self.snr <= 0.0 || self.sigma == 0.0 {
            return Ok(());
        }
        let mut rng = seeded_rng(self.seed,t.frame as u64);
        state.additive.iter_mut().for_each(|a| *a += complex_gaussian(&mut rng,self.sigma));
        Ok(())
    }
}
