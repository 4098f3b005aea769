use clap;
use std::path::PathBuf;
use crate::analysis::{AnalysisConfig, HeightControl};

#[derive(clap::Parser,Debug)]
#[command(about = "reconstruct image volumes from simulated measurements")]
pub struct ReconArgs {
    #[command(subcommand)]
    pub action: ReconAction,
}

#[derive(clap::Subcommand,Debug)]
pub enum ReconAction {
    /// reconstruct every frame of a measurement with each configured reconstructor
    Run(RunArgs),
    /// write a reconstructor list to modify
    NewConfig(NewConfigArgs),
}

#[derive(clap::Args,Debug)]
pub struct RunArgs {
    /// complete measurement file
    pub measurement:PathBuf,
    /// toml with a reconstructors list. A scenario file works too.
    #[clap(short, long)]
    pub config:Option<PathBuf>,
    /// directory receiving the volumes
    #[clap(short, long, default_value = ".")]
    pub output_dir:PathBuf,
    /// also write magnitude niftis
    #[clap(long)]
    pub nifti:bool,
    /// score activation detection against the stored ground truth at this alpha
    #[clap(long)]
    pub alpha:Option<f64>,
    #[clap(long, value_enum, default_value_t = HeightControl::Fpr)]
    pub height_control:HeightControl,
    /// time course to test, defaults to the first stored one
    #[clap(long)]
    pub dynamic:Option<String>,
}

impl RunArgs {
    pub fn analysis(&self) -> Option<AnalysisConfig> {
        self.alpha.map(|alpha| AnalysisConfig {
            alpha,
            height_control:self.height_control,
            dynamic:self.dynamic.clone(),
        })
    }
}

#[derive(clap::Args,Debug)]
pub struct NewConfigArgs {
    pub destination:PathBuf,
}
