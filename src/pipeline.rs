//! One job from configuration to exported artifacts.
//!
//! Each step is its own function so the batch runner can record them as
//! separate stages.

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::config::AnalysisParams;
use crate::ico::{icosahedral_fraction, load_voronoi_csv};
use crate::job::{FrameWindow, hold_window};
use crate::msd::msd_curve;
use crate::mto::{MtoReport, estimate_diffusion};
use crate::output::{OutputArtifacts, ReportMetadata, export_report, resolve_artifacts};
use crate::table::Table;
use crate::trajectory::{Trajectory, load_positions_csv};

#[derive(Debug, Clone)]
pub struct LoadedJob {
    pub trajectory: Trajectory,
    pub window: FrameWindow,
}

pub fn load_job(params: &AnalysisParams) -> Result<LoadedJob> {
    let trajectory = load_positions_csv(&params.input.positions)?;
    let window = hold_window(trajectory.steps(), &params.job).with_context(|| {
        format!(
            "Unable to select the hold window from {}",
            params.input.positions.display()
        )
    })?;
    info!(
        frames = trajectory.frame_count(),
        particles = trajectory.particle_count(),
        window = window.len(),
        "trajectory loaded"
    );
    Ok(LoadedJob { trajectory, window })
}

pub fn run_diffusion(params: &AnalysisParams, loaded: &LoadedJob) -> Result<MtoReport> {
    let report = estimate_diffusion(
        &loaded.trajectory,
        &loaded.window,
        &params.job.elements,
        params.analysis.significance_level,
    )
    .context("Multiple time origin diffusion estimate failed")?;
    Ok(report)
}

/// MSD curve over the hold window, or `None` when its export is disabled.
pub fn run_msd(params: &AnalysisParams, loaded: &LoadedJob) -> Result<Option<Table>> {
    if !params.output.toggles.msd {
        return Ok(None);
    }
    let curve = msd_curve(&loaded.trajectory, &loaded.window, &params.job.elements)
        .context("MSD curve over the hold window failed")?;
    Ok(Some(curve))
}

/// Icosahedral fraction, or `None` when disabled in the configuration.
pub fn run_icosahedral(params: &AnalysisParams) -> Result<Option<f64>> {
    if !params.ico.enabled {
        return Ok(None);
    }
    let path = params
        .input
        .voronoi
        .as_ref()
        .ok_or_else(|| anyhow!("[ico] is enabled but no voronoi table is configured"))?;
    let indices = load_voronoi_csv(path)?;
    let fraction = icosahedral_fraction(&indices, params.ico.edges, params.ico.faces)
        .with_context(|| format!("Unable to count icosahedra in {}", path.display()))?;
    info!(fraction, "icosahedral fraction computed");
    Ok(Some(fraction))
}

pub fn export(
    params: &AnalysisParams,
    loaded: &LoadedJob,
    report: &MtoReport,
    msd: Option<&Table>,
    icosahedral: Option<f64>,
) -> Result<OutputArtifacts> {
    let artifacts = resolve_artifacts(&params.output);
    let metadata = ReportMetadata {
        job: params.source.display().to_string(),
        timestep: params.job.timestep,
        hold_start: params.job.hold_start(),
        frames: loaded.window.len(),
        species: params.job.elements.clone(),
        icosahedral_fraction: icosahedral,
    };
    export_report(&artifacts, report, msd, &metadata)?;
    Ok(artifacts)
}
