use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use sim_conf::scenario::{ReconstructorConfig, ReconstructorSet};
use sim_conf::sim_conf::ConfigFile;
use recon::args::*;
use recon::analysis::analyze_measurement;
use recon::output::{write_analysis, write_outputs};
use recon::reconstructor::{reconstruct, ReconError};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = ReconArgs::parse();
    if let Err(e) = run(&args) {
        error!("{}",e);
        std::process::exit(1);
    }
}

fn reconstructors(args:&RunArgs) -> Result<Vec<ReconstructorConfig>,ReconError> {
    let set = match &args.config {
        Some(path) => ReconstructorSet::from_file(path)?,
        None => ReconstructorSet::default(),
    };
    Ok(match set.reconstructors.is_empty() {
        true => vec![ReconstructorConfig::default()],
        false => set.reconstructors
    })
}

fn run(args:&ReconArgs) -> Result<(),ReconError> {
    use ReconAction::*;
    match &args.action {
        Run(args) => {
            let stem = args.measurement.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("recon")
                .to_string();
            for (i,config) in reconstructors(args)?.iter().enumerate() {
                let output = reconstruct(&args.measurement,config)?;
                let base = format!("{}_r{}_{}",stem,i,config.name());
                let written = write_outputs(&args.output_dir,&base,&output,args.nifti)?;
                info!("{}: {} of {} frames converged, first volume {:?}",base,output.n_converged(),written.len(),written.first());
                if let Some(analysis) = args.analysis() {
                    let a = analyze_measurement(&args.measurement,&output.volumes,&analysis)?;
                    let stat = write_analysis(&args.output_dir,&base,&a,args.nifti)?;
                    info!("{}: balanced accuracy {:.3}, statistic map {:?}",base,a.confusion.balanced_accuracy(),stat);
                }
            }
        }
        NewConfig(args) => {
            let set = ReconstructorSet {
                reconstructors:vec![
                    ReconstructorConfig::default(),
                    ReconstructorConfig::Sequential {
                        backend:Default::default(),
                        density_compensation:Default::default(),
                        restart_strategy:Default::default(),
                        max_iter_per_frame:15,
                        max_iter_first_frame:50,
                        tolerance:1e-4,
                        regularization:Default::default(),
                    },
                ]
            };
            let path = set.to_file(&args.destination)?;
            info!("reconstructor list written to {:?}",path);
        }
    }
    Ok(())
}
