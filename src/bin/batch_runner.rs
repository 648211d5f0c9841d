use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use md_diffusion::batch::{JobReport, JobStage, record_failure_marker, run_stage};
use md_diffusion::config::{BatchJob, BatchParams, load_batch_from_file, load_from_file};
use md_diffusion::pipeline::{export, load_job, run_diffusion, run_icosahedral, run_msd};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/batch.toml"));

    let batch = load_batch_from_file(&config_path)
        .with_context(|| format!("Failed to load batch config {}", config_path.display()))?;

    let total = batch.jobs.len();
    let mut reports = Vec::with_capacity(total);
    for (index, job) in batch.jobs.iter().enumerate() {
        println!("[batch] running job {}/{}: {}", index + 1, total, job.name);
        let report = run_job(&batch, job);

        if report.failed() {
            let directory = job_directory(&job.config);
            match record_failure_marker(&directory) {
                Ok(path) => println!("[batch]   failure marker written to {}", path.display()),
                Err(err) => eprintln!("[batch]   {err:#}"),
            }
        }
        println!("{}", "-".repeat(79));
        reports.push(report);
    }

    let failed: Vec<&JobReport> = reports.iter().filter(|r| r.failed()).collect();
    println!(
        "[batch] completed {} jobs, {} with errors.",
        total,
        failed.len()
    );
    for report in failed {
        let stages: Vec<String> = report
            .failed_stages()
            .iter()
            .map(|stage| stage.to_string())
            .collect();
        println!("  -> {} (failed: {})", report.job, stages.join(", "));
    }
    Ok(())
}

fn run_job(batch: &BatchParams, job: &BatchJob) -> JobReport {
    let mut report = JobReport::new(job.name.clone());

    let loaded = run_stage(&mut report, JobStage::Load, || {
        let mut params = load_from_file(&job.config)?;
        batch.apply_to(&mut params)?;
        let loaded = load_job(&params)?;
        Ok((params, loaded))
    });

    let Some((params, loaded)) = loaded else {
        return report;
    };

    let diffusion = run_stage(&mut report, JobStage::Diffusion, || {
        run_diffusion(&params, &loaded)
    });
    let msd = run_stage(&mut report, JobStage::Msd, || run_msd(&params, &loaded)).flatten();
    let icosahedral =
        run_stage(&mut report, JobStage::Icosahedral, || run_icosahedral(&params)).flatten();

    if let Some(diffusion) = diffusion {
        run_stage(&mut report, JobStage::Export, || {
            let artifacts = export(&params, &loaded, &diffusion, msd.as_ref(), icosahedral)?;
            println!("[batch]   outputs in {}", artifacts.directory.display());
            Ok(())
        });
    }
    report
}

fn job_directory(config: &Path) -> PathBuf {
    config
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
