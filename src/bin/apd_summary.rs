use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use md_diffusion::aggregate::{
    load_apd_csv, load_crystallization_csv, merge_crystallization, summarize_apd,
};
use md_diffusion::output::{ensure_directory, write_apd_summary_csv, write_joined_apd_csv};

/// Merge per-job APD values with crystallization flags and average them.
#[derive(Parser, Debug)]
#[command(author, version, about = "Average APD over non-crystallized jobs")]
struct ApdOptions {
    /// Table of `system,composition,steps,job,apd` rows.
    #[arg(long, value_name = "FILE")]
    apd: PathBuf,

    /// External crystallization table (`alloy,Comp,Thold,Job,Run Crystallized`).
    #[arg(long, value_name = "FILE")]
    crystallization: PathBuf,

    /// Directory for the joined and averaged tables.
    #[arg(long, value_name = "DIR", default_value = "analysis_data")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let options = ApdOptions::parse();

    let apd = load_apd_csv(&options.apd)?;
    let crystallization = load_crystallization_csv(&options.crystallization)?;
    let joined = merge_crystallization(&apd, &crystallization)
        .context("Unable to match APD rows against crystallization data")?;
    let summary = summarize_apd(&joined);

    ensure_directory(&options.output)?;
    let joined_path = options.output.join("allapd.csv");
    let summary_path = options.output.join("meanapd.csv");
    write_joined_apd_csv(&joined_path, &joined)?;
    write_apd_summary_csv(&summary_path, &summary)?;

    println!(
        "[apd] joined {} of {} jobs into {} groups.",
        joined.len(),
        apd.len(),
        summary.len()
    );
    for group in &summary {
        println!(
            "  {} {} {:>10}: apd = {:.6} ± {:.6} (n = {})",
            group.system, group.composition, group.steps, group.mean, group.sem, group.count
        );
    }
    println!("  -> {}", joined_path.display());
    println!("  -> {}", summary_path.display());
    Ok(())
}
