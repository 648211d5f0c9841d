mod cli;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use md_diffusion::config;
use md_diffusion::pipeline::{export, load_job, run_diffusion, run_icosahedral, run_msd};
use tracing_subscriber::EnvFilter;

use crate::cli::CliOptions;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = CliOptions::parse();

    let config_path = normalize_config_path(&cli.config)?;
    let mut params = config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(alpha) = cli.alpha {
        params.analysis.significance_level = alpha;
        params.analysis.validate().context("invalid --alpha override")?;
    }

    println!("Configuration summary:");
    for line in params.summary_lines() {
        println!("  - {line}");
    }

    if cli.dry_run {
        println!("Dry-run requested; exiting without running the analysis.");
        return Ok(());
    }

    let start = Instant::now();
    let loaded = load_job(&params)?;
    let report = run_diffusion(&params, &loaded)?;
    let msd = run_msd(&params, &loaded)?;
    let icosahedral = run_icosahedral(&params)?;
    let artifacts = export(&params, &loaded, &report, msd.as_ref(), icosahedral)?;

    println!(
        "Analysis finished in {:.3?} over {} time origins.",
        start.elapsed(),
        report.origins.len()
    );
    for estimate in &report.estimates {
        println!(
            "  {:<6} D = {:.6e}  sem = {:.3e}  batch = {:.3e}  ({} settled)",
            estimate.label, estimate.diffusion, estimate.sem, estimate.batch, estimate.settled_count
        );
    }
    if let Some(fraction) = icosahedral {
        println!("  icosahedral fraction = {fraction:.4}");
    }
    println!("Outputs in {}", artifacts.directory.display());
    Ok(())
}

fn normalize_config_path(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }

    Err(anyhow!(
        "configuration file {} does not exist",
        path.display()
    ))
}
