use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::aggregate::{ApdSummary, JoinedApd};
use crate::config::{OutputPaths, OutputToggles};
use crate::mto::{DiffusionEstimate, MtoReport};
use crate::table::Table;

#[derive(Debug, Clone)]
pub struct OutputArtifacts {
    pub directory: PathBuf,
    pub raw_csv: PathBuf,
    pub settled_csv: PathBuf,
    pub summary_csv: PathBuf,
    pub summary_json: PathBuf,
    pub msd_csv: PathBuf,
    pub toggles: OutputToggles,
}

/// Context written next to the estimates in the JSON summary.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub job: String,
    pub timestep: f64,
    pub hold_start: u64,
    pub frames: usize,
    pub species: Vec<String>,
    pub icosahedral_fraction: Option<f64>,
}

pub fn resolve_artifacts(paths: &OutputPaths) -> OutputArtifacts {
    let directory = paths.directory.clone();

    OutputArtifacts {
        directory: directory.clone(),
        raw_csv: resolve_path(&directory, &paths.raw_csv),
        settled_csv: resolve_path(&directory, &paths.settled_csv),
        summary_csv: resolve_path(&directory, &paths.summary_csv),
        summary_json: resolve_path(&directory, &paths.summary_json),
        msd_csv: resolve_path(&directory, &paths.msd_csv),
        toggles: paths.toggles,
    }
}

fn resolve_path(base: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        base.join(relative)
    }
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create output directory {}", path.display()))?;
    }
    Ok(())
}

/// Write every artifact the toggles ask for.
pub fn export_report(
    artifacts: &OutputArtifacts,
    report: &MtoReport,
    msd: Option<&Table>,
    metadata: &ReportMetadata,
) -> Result<()> {
    ensure_directory(&artifacts.directory)?;
    if let Some(curve) = msd.filter(|_| artifacts.toggles.msd) {
        write_table_csv(&artifacts.msd_csv, curve)?;
    }
    if artifacts.toggles.csv {
        write_table_csv(&artifacts.raw_csv, &report.raw)?;
        write_table_csv(&artifacts.settled_csv, &report.settled)?;
        write_estimates_csv(&artifacts.summary_csv, &report.estimates)?;
    }
    if artifacts.toggles.json {
        write_report_json(&artifacts.summary_json, report, metadata)?;
    }
    Ok(())
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{:.12e}", value)
    }
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    csv::Writer::from_path(path)
        .with_context(|| format!("Unable to create CSV file {}", path.display()))
}

/// Write a table with one header row. NaN cells are left empty.
pub fn write_table_csv(path: &Path, table: &Table) -> Result<()> {
    let mut writer = create_writer(path)?;
    writer.write_record(&table.columns)?;

    for (index, row) in table.rows.iter().enumerate() {
        let record: Vec<String> = row.iter().map(|v| format_value(*v)).collect();
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write row {index} to {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}

pub fn write_estimates_csv(path: &Path, estimates: &[DiffusionEstimate]) -> Result<()> {
    let mut writer = create_writer(path)?;
    writer.write_record([
        "label",
        "diffusion",
        "sem",
        "batch",
        "settled_count",
        "correlation_length",
    ])?;

    for estimate in estimates {
        let correlation_length = estimate
            .correlation_length
            .map(|k| k.to_string())
            .unwrap_or_default();
        writer.write_record([
            estimate.label.clone(),
            format_value(estimate.diffusion),
            format_value(estimate.sem),
            format_value(estimate.batch),
            estimate.settled_count.to_string(),
            correlation_length,
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}

/// JSON summary of a report. Non-finite numbers become `null`.
pub fn write_report_json(path: &Path, report: &MtoReport, metadata: &ReportMetadata) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut root = serde_json::Map::new();
    root.insert(
        "metadata".into(),
        serde_json::to_value(metadata).context("Failed to serialize metadata for JSON export")?,
    );
    root.insert(
        "significance_level".into(),
        serde_json::json!(report.significance_level),
    );
    root.insert(
        "estimates".into(),
        serde_json::to_value(&report.estimates)
            .context("Failed to serialize estimates for JSON export")?,
    );
    root.insert(
        "origins".into(),
        serde_json::to_value(&report.origins)
            .context("Failed to serialize time origins for JSON export")?,
    );

    let file = File::create(path)
        .with_context(|| format!("Unable to create JSON file {}", path.display()))?;

    serde_json::to_writer_pretty(file, &serde_json::Value::Object(root))
        .with_context(|| format!("Failed to write JSON payload to {}", path.display()))
}

pub fn write_joined_apd_csv(path: &Path, joined: &[JoinedApd]) -> Result<()> {
    let mut writer = create_writer(path)?;
    writer.write_record(["system", "composition", "steps", "job", "apd", "crystallized"])?;

    for record in joined {
        writer.write_record([
            record.system.clone(),
            record.composition.clone(),
            record.steps.to_string(),
            record.job.clone(),
            record.apd.map(format_value).unwrap_or_default(),
            record.crystallized.to_string(),
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}

pub fn write_apd_summary_csv(path: &Path, summary: &[ApdSummary]) -> Result<()> {
    let mut writer = create_writer(path)?;
    writer.write_record(["system", "composition", "steps", "mean", "sem", "count"])?;

    for group in summary {
        writer.write_record([
            group.system.clone(),
            group.composition.clone(),
            group.steps.to_string(),
            format_value(group.mean),
            format_value(group.sem),
            group.count.to_string(),
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}
