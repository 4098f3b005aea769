use ndarray::{Array3, Zip};
use tracing::{debug, warn};
use phantom::{FrameState, Phantom};
use sim_conf::scenario::{EventConfig, HrfModel};
use sim_conf::sim_conf::SimConfig;
use crate::handler::{Handler, HandlerError, TimeCourse, TimePoint};
use crate::hrf::hrf_kernel;

/// time step of the regressor, seconds
const REGRESSOR_DT:f64 = 0.05;

/// on/off paradigm clipped to the simulation time
#[derive(Clone,Debug,PartialEq)]
pub struct BlockDesign {
    pub block_on:f64,
    pub block_off:f64,
    pub offset:f64,
    /// duration after clipping
    pub duration:f64,
}

impl BlockDesign {

    pub fn new(block_on:f64,block_off:f64,duration:f64,offset:f64,max_sim_time:f64) -> Self {
        let available = (max_sim_time - offset).max(0.0);
        if duration > available {
            warn!("block design of {} s starting at {} s is clipped to {} s",duration,offset,available);
        }
        Self {
            block_on,
            block_off,
            offset,
            duration:duration.min(available),
        }
    }

    pub fn period(&self) -> f64 {
        self.block_on + self.block_off
    }

    pub fn n_complete_cycles(&self) -> usize {
        (self.duration/self.period()).floor() as usize
    }

    pub fn has_partial_cycle(&self) -> bool {
        self.duration - self.n_complete_cycles() as f64 * self.period() > 0.0
    }

    /// one event per on block, the last one possibly shortened
    pub fn events(&self) -> Vec<EventConfig> {
        let end = self.offset + self.duration;
        let n_blocks = (self.duration/self.period()).ceil() as usize;
        (0..n_blocks).filter_map(|i| {
            let onset = self.offset + i as f64 * self.period();
            let stop = (onset + self.block_on).min(end);
            match stop > onset {
                true => Some(EventConfig{onset,duration:stop - onset,amplitude:1.0}),
                false => None
            }
        }).collect()
    }
}

/// Stimulus regressor sampled on a fine grid covering the simulation
#[derive(Clone,Debug)]
pub struct Regressor {
    dt:f64,
    values:Vec<f64>,
}

impl Regressor {

    pub fn new(events:&[EventConfig],hrf:HrfModel,max_sim_time:f64) -> Self {
        let dt = REGRESSOR_DT;
        let n = (max_sim_time/dt).ceil() as usize + 1;
        let mut boxcar = vec![0.0;n];
        for e in events {
            // events outside the simulation are dropped
            let first = (e.onset/dt).round() as usize;
            let last = (((e.onset + e.duration)/dt).round() as usize).min(n);
            for v in boxcar.iter_mut().take(last).skip(first) {
                *v += e.amplitude;
            }
        }
        let values = match hrf_kernel(hrf,dt) {
            None => boxcar,
            Some(kernel) => {
                let mut conv = vec![0.0;n];
                for (i,c) in conv.iter_mut().enumerate() {
                    *c = kernel.iter().enumerate().take(i + 1).map(|(j,k)| k * boxcar[i - j]).sum();
                }
                let peak = conv.iter().fold(0.0f64,|m,v| m.max(v.abs()));
                if peak > 0.0 {
                    conv.iter_mut().for_each(|v| *v /= peak);
                }
                conv
            }
        };
        Self {
            dt,
            values,
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// linear interpolation, 0 outside the simulation
    pub fn value(&self,t_s:f64) -> f64 {
        if t_s < 0.0 {
            return 0.0;
        }
        let x = t_s/self.dt;
        let i = x.floor() as usize;
        match (self.values.get(i),self.values.get(i + 1)) {
            (Some(a),Some(b)) => a + (b - a)*(x - i as f64),
            (Some(a),None) => *a,
            _ => 0.0
        }
    }
}

/// Changes R2* inside the roi following the stimulus regressor
#[derive(Clone,Debug)]
pub struct ActivationHandler {
    name:String,
    roi:Array3<bool>,
    events:Vec<EventConfig>,
    regressor:Regressor,
    /// 1/ms
    delta_r2s:f32,
}

impl ActivationHandler {

    /// delta_r2s in 1/s
    pub fn new(name:&str,events:&[EventConfig],delta_r2s:f64,hrf:HrfModel,phantom:&Phantom,sim:&SimConfig) -> Result<Self,HandlerError> {
        let roi = phantom.roi_mask();
        if !roi.iter().any(|r| *r) {
            return Err(HandlerError::EmptyRoi(phantom.roi_tissue.clone()));
        }
        debug!("{} with {} events on {} roi voxels",name,events.len(),phantom.n_roi_voxels());
        Ok(Self {
            name:name.to_string(),
            roi,
            events:events.to_vec(),
            regressor:Regressor::new(events,hrf,sim.max_sim_time),
            delta_r2s:(delta_r2s/1000.0) as f32,
        })
    }

    pub fn regressor(&self) -> &Regressor {
        &self.regressor
    }
}

impl Handler for ActivationHandler {

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self,state:&mut FrameState,t:TimePoint) -> Result<(),HandlerError> {
        let found = state.dims();
        if found != self.roi.shape() {
            let s = self.roi.shape();
            return Err(HandlerError::ShapeMismatch{found,expected:[s[0],s[1],s[2]]});
        }
        let shift = self.delta_r2s * self.regressor.value(t.t_s) as f32;
        if shift == 0.0 {
            return Ok(());
        }
        Zip::from(&mut state.r2s).and(&self.roi).for_each(|r2s,roi| {
            if *roi {
                *r2s = (*r2s + shift).max(0.0);
            }
        });
        Ok(())
    }

    fn time_course(&self) -> Option<TimeCourse> {
        Some(TimeCourse {
            dt_s:self.regressor.dt(),
            values:self.regressor.values().to_vec(),
            events:self.events.clone(),
        })
    }
}
