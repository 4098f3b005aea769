use std::fmt::Debug;
use dyn_clone::DynClone;
use thiserror::Error;
use tracing::debug;
use phantom::{FrameState, Phantom};
use sim_conf::scenario::{EventConfig, HandlerConfig};
use sim_conf::sim_conf::SimConfig;
use crate::activation::{ActivationHandler, BlockDesign};
use crate::noise::ImageNoiseHandler;

#[derive(Debug,Error)]
pub enum HandlerError {
    #[error("roi tissue {0} is empty in the phantom")]
    EmptyRoi(String),
    #[error("frame state has shape {found:?}, handler was built for {expected:?}")]
    ShapeMismatch {
        found:[usize;3],
        expected:[usize;3],
    },
}

/// simulation time of a shot, and the frame it belongs to
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct TimePoint {
    /// seconds since the start of the acquisition
    pub t_s:f64,
    pub frame:usize,
}

/// Regressor a handler follows, sampled every dt_s from t = 0, with the events it was built from
#[derive(Clone,Debug,PartialEq)]
pub struct TimeCourse {
    pub dt_s:f64,
    pub values:Vec<f64>,
    pub events:Vec<EventConfig>,
}

/// A time dependent perturbation of the phantom.
pub trait Handler: DynClone + Debug + Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self,state:&mut FrameState,t:TimePoint) -> Result<(),HandlerError>;
    /// None for handlers without a deterministic time course
    fn time_course(&self) -> Option<TimeCourse> {
        None
    }
}

dyn_clone::clone_trait_object!(Handler);

/// Handlers in declaration order.
#[derive(Clone,Debug,Default)]
pub struct HandlerChain {
    handlers:Vec<Box<dyn Handler>>,
}

impl HandlerChain {

    pub fn new(handlers:Vec<Box<dyn Handler>>) -> Self {
        Self {
            handlers
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    /// named time courses of the handlers that have one, in declaration order
    pub fn time_courses(&self) -> Vec<(String,TimeCourse)> {
        self.handlers.iter().filter_map(|h| h.time_course().map(|tc| (h.name().to_string(),tc))).collect()
    }

    /// phantom state at time t
    pub fn state_at(&self,phantom:&Phantom,t:TimePoint) -> Result<FrameState,HandlerError> {
        let mut state = FrameState::from_phantom(phantom);
        self.apply(&mut state,t)?;
        Ok(state)
    }

    pub fn apply(&self,state:&mut FrameState,t:TimePoint) -> Result<(),HandlerError> {
        for h in self.handlers.iter() {
            h.apply(state,t)?;
        }
        Ok(())
    }
}

pub fn build_handlers(configs:&[HandlerConfig],phantom:&Phantom,sim:&SimConfig) -> Result<HandlerChain,HandlerError> {
    let mut handlers:Vec<Box<dyn Handler>> = vec![];
    for (index,config) in configs.iter().enumerate() {
        debug!("building handler {} ({})",index,config.name());
        let h:Box<dyn Handler> = match config {
            HandlerConfig::BlockActivation{block_on,block_off,duration,offset,delta_r2s,hrf} => {
                let design = BlockDesign::new(*block_on,*block_off,*duration,*offset,sim.max_sim_time);
                Box::new(ActivationHandler::new(config.name(),&design.events(),*delta_r2s,*hrf,phantom,sim)?)
            }
            HandlerConfig::EventActivation{events,delta_r2s,hrf} => {
                Box::new(ActivationHandler::new(config.name(),events,*delta_r2s,*hrf,phantom,sim)?)
            }
            HandlerConfig::ImageNoise{snr} => {
                Box::new(ImageNoiseHandler::new(*snr,index,phantom,sim))
            }
        };
        handlers.push(h);
    }
    Ok(HandlerChain::new(handlers))
}
