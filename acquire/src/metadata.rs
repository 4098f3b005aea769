use headfile::headfile::Headfile;
use handlers::HandlerChain;
use mr_data::ground_truth::{Dynamic, EventRecord, GroundTruth, TissueRecord};
use phantom::Phantom;
use sampler::AcquisitionPlan;
use sim_conf::scenario::ScenarioConfig;

/// Parameters stored with a measurement, enough to reprocess it without the scenario files.
/// Nothing that depends on the machine or on n_jobs goes in here.
pub fn run_metadata(config:&ScenarioConfig,plan:&AcquisitionPlan,phantom:&Phantom,noise_sigma:f32) -> Headfile {
    let sim = &config.sim_conf;
    let mut h = Headfile::new();
    h.insert("name",&config.name);
    h.insert_list("shape",&sim.dims());
    h.insert_list("fov_mm",&sim.fov());
    h.insert_list("res_mm",&sim.res_mm());
    h.insert("TR",sim.seq.tr_ms);
    h.insert("TE",sim.seq.te_ms);
    h.insert("FA",sim.seq.fa_deg);
    h.insert("n_coils",sim.hardware.n_coils);
    h.insert("dwell_time_ms",sim.hardware.dwell_time_ms);
    h.insert("field",sim.hardware.field);
    h.insert("max_sim_time",sim.max_sim_time);
    h.insert("rng_seed",sim.rng_seed);
    h.insert("n_frames",plan.n_frames);
    h.insert("shots_per_frame",plan.shots_per_frame);
    h.insert("samples_per_shot",plan.samples_per_shot);
    h.insert("n_shots",plan.n_shots());
    h.insert("chunk_size",plan.chunk_size);
    h.insert("n_chunks",plan.n_chunks());
    h.insert("dropped_frames",plan.dropped_frames);
    h.insert("frame_duration_s",plan.frame_time_s(1));
    h.insert("simulation_duration_s",plan.duration_s());
    h.insert("sampler",config.sampler.name());
    h.insert("nufft_backend",config.engine.nufft_backend.name());
    h.insert("model",config.engine.model.name());
    h.insert("snr",config.engine.snr);
    h.insert("kspace_noise_sigma",noise_sigma);
    h.insert("phantom",&phantom.name);
    h.insert("sub_id",phantom.sub_id);
    h.insert("roi_tissue",&phantom.roi_tissue);
    let handlers:Vec<&str> = config.handlers.iter().map(|handler| handler.name()).collect();
    h.insert_list("handlers",&handlers);
    h
}

/// phantom and handler time courses, stored with the k-space for scoring
pub fn ground_truth(phantom:&Phantom,handlers:&HandlerChain) -> GroundTruth {
    let tissues = phantom.tissues.iter().map(|t| TissueRecord {
        name:t.name.clone(),
        pd:t.pd,
        t1_ms:t.t1_ms,
        t2_ms:t.t2_ms,
        t2s_ms:t.t2s_ms,
    }).collect();
    let dynamics = handlers.time_courses().into_iter().map(|(name,tc)| Dynamic {
        name,
        dt_s:tc.dt_s,
        values:tc.values,
        events:tc.events.iter().map(|e| EventRecord{onset:e.onset,duration:e.duration,amplitude:e.amplitude}).collect(),
    }).collect();
    GroundTruth {
        phantom:phantom.name.clone(),
        roi_tissue:phantom.roi_tissue.clone(),
        tissues,
        labels:phantom.labels.clone(),
        dynamics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handlers::build_handlers;
    use sampler::build_sampler;
    use sim_conf::scenario::{HandlerConfig, HrfModel};

    #[test]
    fn metadata_describes_the_run() {
        let mut c = ScenarioConfig::default();
        c.sim_conf.shape = vec![8,8,4];
        c.sim_conf.max_sim_time = 4.0;
        let s = build_sampler(&c.sampler,&c.sim_conf).unwrap();
        let plan = AcquisitionPlan::new(s.as_ref(),&c.sim_conf,1).unwrap();
        let p = Phantom::build(&c.phantom,&c.sim_conf).unwrap();
        let h = run_metadata(&c,&plan,&p,0.0);
        assert_eq!(h.get_list::<usize>("shape").unwrap(),vec![8,8,4]);
        assert_eq!(h.get_parsed::<usize>("n_frames").unwrap(),plan.n_frames);
        assert_eq!(h.get("sampler").unwrap(),"stack_of_spiral");
        assert!(!h.contains("n_jobs"));
    }

    #[test]
    fn ground_truth_carries_phantom_and_activation() {
        let mut c = ScenarioConfig::default();
        c.sim_conf.shape = vec![8,8,4];
        c.sim_conf.max_sim_time = 40.0;
        let p = Phantom::build(&c.phantom,&c.sim_conf).unwrap();
        let configs = vec![
            HandlerConfig::ImageNoise{snr:10.0},
            HandlerConfig::BlockActivation{block_on:10.0,block_off:10.0,duration:40.0,offset:0.0,delta_r2s:-5.0,hrf:HrfModel::None},
        ];
        let chain = build_handlers(&configs,&p,&c.sim_conf).unwrap();
        let t = ground_truth(&p,&chain);
        assert_eq!(t.labels,p.labels);
        assert_eq!(t.tissues.len(),p.tissues.len());
        assert_eq!(t.roi_mask(),p.roi_mask());
        assert_eq!(t.dynamics.len(),1);
        let d = t.dynamic("block_activation").unwrap();
        assert_eq!(d.events.len(),2);
        assert_eq!(d.value(5.0),1.0);
        assert_eq!(d.value(15.0),0.0);
    }
}
