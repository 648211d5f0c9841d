use std::path::PathBuf;

use clap::Parser;

/// Command line options for the diffusion analysis.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Self-diffusion from multiple time origins of an MD trajectory"
)]
pub struct CliOptions {
    /// Path to the analysis TOML configuration file.
    #[arg(long, value_name = "FILE", default_value = "config/analysis.toml")]
    pub config: PathBuf,

    /// Override the settling significance level configured in the TOML file.
    #[arg(long, value_name = "ALPHA")]
    pub alpha: Option<f64>,

    /// Display configuration summary without running the analysis.
    #[arg(long)]
    pub dry_run: bool,
}
