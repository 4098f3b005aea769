use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use crossbeam_channel::{bounded, unbounded, Sender};
use ndarray::{s, Array2, Array3, Array4};
use num_complex::Complex32;
use thiserror::Error;
use tracing::{debug, error, info};
use handlers::{build_handlers, HandlerChain, HandlerError, TimePoint};
use mr_data::measurement::{MeasurementDims, MeasurementError, MeasurementWriter, ShotRecord};
use nufft::{build_operator, coil_image, smaps, NufftError, NufftOperator, Nudft};
use phantom::{FrameState, Phantom, PhantomError};
use sampler::{build_sampler, AcquisitionPlan, Sampler, SamplerError};
use sim_conf::error::ConfigError;
use sim_conf::scenario::{ScenarioConfig, SignalModel};
use utils::{complex_gaussian, mean_signal, mix_seed, seeded_rng};
use crate::metadata::{ground_truth, run_metadata};
use crate::template;

/// rng stream of the k-space noise, apart from the handler streams
const KSPACE_NOISE_STREAM:u64 = u64::MAX;

#[derive(Debug,Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Phantom(#[from] PhantomError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error(transparent)]
    Nufft(#[from] NufftError),
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
    #[error("chunk {chunk} failed: {source}")]
    Chunk {
        chunk:usize,
        source:Box<AcquisitionError>,
    },
    #[error("only {written} of {expected} chunks were written")]
    Incomplete {
        written:usize,
        expected:usize,
    },
}

/// chunk indices in acquisition order, stops at the first failed send
fn enqueue_chunks(job_tx:&Sender<usize>,n_chunks:usize) -> usize {
    for c in 0..n_chunks {
        if job_tx.send(c).is_err() {
            return c;
        }
    }
    n_chunks
}

/// Everything a run needs, built and checked before any k-space is simulated
#[derive(Debug)]
pub struct Acquisition {
    config:ScenarioConfig,
    phantom:Phantom,
    handlers:HandlerChain,
    sampler:Box<dyn Sampler>,
    operator:Box<dyn NufftOperator>,
    maps:Array4<Complex32>,
    plan:AcquisitionPlan,
    noise_sigma:f32,
    file_name:String,
}

/// simulate the scenario into a measurement file in out_dir
pub fn acquire(config:&ScenarioConfig,out_dir:&Path) -> Result<PathBuf,AcquisitionError> {
    let acq = Acquisition::prepare(config)?;
    let path = out_dir.join(acq.file_name());
    acq.run(&path)
}

impl Acquisition {

    pub fn prepare(config:&ScenarioConfig) -> Result<Self,AcquisitionError> {
        config.validate()?;
        let file_name = template::render(&config.output_template,config)?;
        let sim = &config.sim_conf;
        let phantom = Phantom::build(&config.phantom,sim)?;
        let handlers = build_handlers(&config.handlers,&phantom,sim)?;
        let sampler = build_sampler(&config.sampler,sim)?;
        let plan = AcquisitionPlan::new(sampler.as_ref(),sim,config.engine.chunk_size)?;
        let maps = smaps(sim.dims(),sim.hardware.n_coils);
        let operator = build_operator(config.engine.nufft_backend,sim.dims());
        let noise_sigma = match config.engine.snr > 0.0 {
            true => {
                let reference = FrameState::from_phantom(&phantom).image_at(&sim.seq,sim.seq.te_ms);
                (mean_signal(&reference) as f64 / config.engine.snr) as f32
            }
            false => 0.0
        };
        Ok(Self {
            config:config.clone(),
            phantom,
            handlers,
            sampler,
            operator,
            maps,
            plan,
            noise_sigma,
            file_name,
        })
    }

    pub fn plan(&self) -> &AcquisitionPlan {
        &self.plan
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn dims(&self) -> MeasurementDims {
        MeasurementDims {
            matrix:self.config.sim_conf.dims(),
            n_coils:self.config.sim_conf.hardware.n_coils,
            n_frames:self.plan.n_frames,
            shots_per_frame:self.plan.shots_per_frame,
            samples_per_shot:self.plan.samples_per_shot,
        }
    }

    /// k-space of one shot for every coil, (coils, samples)
    fn simulate_shot(&self,state:&FrameState,traj:&Array2<f32>) -> Result<Array2<Complex32>,AcquisitionError> {
        let seq = &self.config.sim_conf.seq;
        let n_coils = self.maps.shape()[0];
        let n = traj.nrows();
        let mut data = Array2::<Complex32>::zeros((n_coils,n));
        match self.config.engine.model {
            SignalModel::Simple => {
                let img = state.image_at(seq,seq.te_ms);
                for c in 0..n_coils {
                    let k = self.operator.forward(&coil_image(&img,&self.maps,c),&traj.view())?;
                    data.row_mut(c).assign(&k);
                }
            }
            SignalModel::T2s => {
                // every sample sees its own echo time around TE
                let nudft = Nudft::new(self.config.sim_conf.dims());
                let dwell = self.config.sim_conf.hardware.dwell_time_ms;
                let m = state.magnetization(seq);
                for i in 0..n {
                    let t = (seq.te_ms + (i as f64 - (n/2) as f64) * dwell).max(0.0);
                    let img = state.decay(&m,t);
                    let k = [traj[[i,0]],traj[[i,1]],traj[[i,2]]];
                    for c in 0..n_coils {
                        data[[c,i]] = nudft.sample(&coil_image(&img,&self.maps,c),k);
                    }
                }
            }
        }
        Ok(data)
    }

    pub fn simulate_chunk(&self,chunk:usize) -> Result<Vec<ShotRecord>,AcquisitionError> {
        let seed = self.config.sim_conf.rng_seed;
        let noise_seed = mix_seed(seed,KSPACE_NOISE_STREAM);
        let mut frame_traj:Option<(usize,Array3<f32>)> = None;
        let mut records = Vec::with_capacity(self.plan.chunk_size);
        for shot in self.plan.chunk_shots(chunk) {
            let frame = self.plan.frame_of(shot);
            let shot_in_frame = self.plan.shot_in_frame(shot);
            // a chunk rarely spans more than two frames, keep only the current one
            let points = match frame_traj.take() {
                Some((f,points)) if f == frame => points,
                _ => self.sampler.frame(frame,seed),
            };
            let traj = points.slice(s![shot_in_frame,..,..]).to_owned();
            frame_traj = Some((frame,points));
            let state = self.handlers.state_at(&self.phantom,TimePoint{t_s:self.plan.shot_time_s(shot),frame})?;
            let mut data = self.simulate_shot(&state,&traj)?;
            if self.noise_sigma > 0.0 {
                let mut rng = seeded_rng(noise_seed,shot as u64);
                data.iter_mut().for_each(|d| *d += complex_gaussian(&mut rng,self.noise_sigma));
            }
            records.push(ShotRecord {
                scan_counter:shot,
                frame,
                shot_in_frame,
                flags:ShotRecord::flags_for(shot_in_frame,self.plan.shots_per_frame),
                traj,
                data,
            });
        }
        Ok(records)
    }

    /// Workers pull chunk indices from a queue and send finished chunks to the writer on this
    /// thread. The first failure stops the run and leaves the file flagged incomplete.
    pub fn run(&self,path:&Path) -> Result<PathBuf,AcquisitionError> {
        let start = Instant::now();
        let n_chunks = self.plan.n_chunks();
        let n_jobs = self.config.engine.n_jobs.clamp(1,n_chunks.max(1));
        let metadata = run_metadata(&self.config,&self.plan,&self.phantom,self.noise_sigma);
        let truth = ground_truth(&self.phantom,&self.handlers);
        let mut writer = MeasurementWriter::create(path,self.dims(),&metadata,&truth,&self.maps)?;
        info!("acquiring {} chunks with {} jobs into {:?}",n_chunks,n_jobs,path);

        let (job_tx,job_rx) = unbounded::<usize>();
        let queued = enqueue_chunks(&job_tx,n_chunks);
        drop(job_tx);
        if queued != n_chunks {
            return Err(AcquisitionError::Incomplete{written:0,expected:n_chunks});
        }
        let (result_tx,result_rx) = bounded::<Result<(usize,Vec<ShotRecord>),AcquisitionError>>(2 * n_jobs);
        let abort = AtomicBool::new(false);

        let (written,failure) = std::thread::scope(|scope| {
            for worker in 0..n_jobs {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let abort = &abort;
                scope.spawn(move || {
                    while let Ok(chunk) = job_rx.recv() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        let result = self.simulate_chunk(chunk)
                            .map(|shots| (chunk,shots))
                            .map_err(|e| AcquisitionError::Chunk{chunk,source:Box::new(e)});
                        let failed = result.is_err();
                        if failed {
                            abort.store(true,Ordering::Relaxed);
                        }
                        if result_tx.send(result).is_err() || failed {
                            break;
                        }
                    }
                    debug!("worker {} done",worker);
                });
            }
            drop(result_tx);

            let mut written = 0;
            let mut failure:Option<AcquisitionError> = None;
            for result in result_rx.iter() {
                if failure.is_some() {
                    continue;
                }
                let outcome = result.and_then(|(chunk,shots)| {
                    for shot in shots.iter() {
                        writer.write_shot(shot)?;
                    }
                    debug!("chunk {} written",chunk);
                    Ok(())
                });
                match outcome {
                    Ok(()) => written += 1,
                    Err(e) => {
                        abort.store(true,Ordering::Relaxed);
                        failure = Some(e);
                    }
                }
            }
            (written,failure)
        });

        if let Some(e) = failure {
            error!("acquisition aborted, {:?} left incomplete: {}",path,e);
            return Err(e);
        }
        if written != n_chunks {
            return Err(AcquisitionError::Incomplete{written,expected:n_chunks});
        }
        let path = writer.finalize()?;
        info!("acquired {} shots in {:.2?}",self.plan.n_shots(),start.elapsed());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_data::measurement::{is_complete, MeasurementReader};
    use nufft::FftBackend;
    use sim_conf::scenario::SamplerConfig;

    fn small_scenario() -> ScenarioConfig {
        let mut c = ScenarioConfig::default();
        c.sim_conf.shape = vec![8,8,4];
        c.sim_conf.fov_mm = vec![16.0,16.0,8.0];
        c.sim_conf.max_sim_time = 2.0;
        c.sim_conf.hardware.n_coils = 2;
        c.sampler = SamplerConfig::StackOfSpiral{accelz:2,nb_revolutions:2.0,constant:false,n_samples:Some(32)};
        c.engine.chunk_size = 4;
        c
    }

    #[test]
    fn failed_chunk_leaves_file_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let mut acq = Acquisition::prepare(&small_scenario()).unwrap();
        // spiral samples are off the grid the fft backend can handle
        acq.operator = Box::new(FftBackend::new([8,8,4]));
        let path = dir.path().join("failed.meas");
        let r = acq.run(&path);
        assert!(matches!(r,Err(AcquisitionError::Chunk{..})));
        assert!(!is_complete(&path).unwrap());
        assert!(matches!(MeasurementReader::open(&path),Err(MeasurementError::Incomplete(_))));
    }

    #[test]
    fn configuration_errors_come_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = small_scenario();
        c.output_template = String::from("{name}_{unknown}.meas");
        assert!(matches!(acquire(&c,dir.path()),Err(AcquisitionError::Config(_))));
        let mut c = small_scenario();
        c.sim_conf.seq.te_ms = 80.0;
        assert!(matches!(acquire(&c,dir.path()),Err(AcquisitionError::Config(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(),0);
    }

    #[test]
    fn queueing_stops_when_no_worker_listens() {
        let (tx,rx) = unbounded::<usize>();
        assert_eq!(enqueue_chunks(&tx,3),3);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(),vec![0,1,2]);
        drop(rx);
        assert_eq!(enqueue_chunks(&tx,3),0);
    }

    #[test]
    fn chunks_spanning_frames_get_each_frame_trajectory() {
        let acq = Acquisition::prepare(&small_scenario()).unwrap();
        let seed = acq.config.sim_conf.rng_seed;
        // two shots per frame, chunk 0 holds frames 0 and 1
        let records = acq.simulate_chunk(0).unwrap();
        for r in records.iter() {
            let expected = acq.sampler.frame(r.frame,seed);
            assert_eq!(r.traj,expected.slice(s![r.shot_in_frame,..,..]));
        }
        assert_eq!(records.iter().map(|r| r.frame).collect::<Vec<_>>(),vec![0,0,1,1]);
    }

    #[test]
    fn chunk_records_are_flagged_and_ordered() {
        let acq = Acquisition::prepare(&small_scenario()).unwrap();
        let plan = acq.plan().clone();
        assert_eq!(plan.shots_per_frame,2);
        let records = acq.simulate_chunk(1).unwrap();
        let counters:Vec<usize> = records.iter().map(|r| r.scan_counter).collect();
        assert_eq!(counters,vec![4,5,6,7]);
        assert_eq!(records[0].frame,2);
        assert_eq!(records[0].flags,ShotRecord::flags_for(0,2));
        assert_eq!(records[1].flags,ShotRecord::flags_for(1,2));
        assert_eq!(records[0].data.shape(),&[2,32]);
    }
}
