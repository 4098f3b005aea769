use clap;
use std::path::PathBuf;

#[derive(clap::Parser,Debug)]
#[command(about = "simulate fmri k-space acquisitions")]
pub struct AcquireArgs {
    #[command(subcommand)]
    pub action: Action,
}

#[derive(clap::Subcommand,Debug)]
pub enum Action {
    /// run a scenario and write the measurement file
    Run(RunArgs),
    /// print the merged, validated scenario without running it
    Resolve(RunArgs),
    /// write the default scenario as a starting point
    NewConfig(NewConfigArgs),
}

#[derive(clap::Args,Debug)]
pub struct RunArgs {
    /// scenario files, merged in order over the defaults
    pub config:Vec<PathBuf>,
    /// dotted.key=value overrides, applied after the files
    #[clap(short, long = "set")]
    pub set:Vec<String>,
    /// directory receiving the measurement
    #[clap(short, long, default_value = ".")]
    pub output_dir:PathBuf,
}

#[derive(clap::Args,Debug)]
pub struct NewConfigArgs {
    pub destination:PathBuf,
}
