use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use sim_conf::layers::ConfigLayers;
use sim_conf::scenario::ScenarioConfig;
use sim_conf::sim_conf::ConfigFile;
use sim_conf::error::ConfigError;
use acquire::args::*;
use acquire::engine::{acquire, AcquisitionError};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = AcquireArgs::parse();
    if let Err(e) = run(&args) {
        error!("{}",e);
        std::process::exit(1);
    }
}

fn resolve(args:&RunArgs) -> Result<ScenarioConfig,ConfigError> {
    let mut layers = ConfigLayers::with_defaults()?;
    for file in args.config.iter() {
        layers.push_file(file)?;
    }
    for assignment in args.set.iter() {
        layers.push_override(assignment)?;
    }
    layers.resolve()
}

fn run(args:&AcquireArgs) -> Result<(),AcquisitionError> {
    use Action::*;
    match &args.action {
        Run(args) => {
            let config = resolve(args)?;
            let path = acquire(&config,&args.output_dir)?;
            info!("measurement written to {:?}",path);
        }
        Resolve(args) => {
            let config = resolve(args)?;
            let value = toml::Value::try_from(&config).map_err(ConfigError::from)?;
            let text = toml::to_string_pretty(&value).map_err(ConfigError::from)?;
            println!("{}",text);
        }
        NewConfig(args) => {
            let path = ScenarioConfig::default().to_file(&args.destination)?;
            info!("default scenario written to {:?}",path);
        }
    }
    Ok(())
}
