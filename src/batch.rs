//! Stage bookkeeping for running many jobs in one pass.
//!
//! A failing stage is recorded and the run moves on; a job with any failed
//! stage gets an `error.txt` marker in its directory.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

pub const ERROR_MARKER_FILE: &str = "error.txt";
pub const ERROR_MARKER_TEXT: &str = "error in analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Load,
    Diffusion,
    Msd,
    Icosahedral,
    Export,
}

impl JobStage {
    pub fn name(self) -> &'static str {
        match self {
            JobStage::Load => "load",
            JobStage::Diffusion => "diffusion",
            JobStage::Msd => "msd",
            JobStage::Icosahedral => "icosahedral",
            JobStage::Export => "export",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub stage: JobStage,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job: String,
    pub outcomes: Vec<StageOutcome>,
}

impl JobReport {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        self.outcomes.iter().any(|o| o.error.is_some())
    }

    pub fn failed_stages(&self) -> Vec<JobStage> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.stage)
            .collect()
    }
}

/// Run one stage and record its outcome. Returns the stage value on success.
pub fn run_stage<T>(
    report: &mut JobReport,
    stage: JobStage,
    action: impl FnOnce() -> Result<T>,
) -> Option<T> {
    match action() {
        Ok(value) => {
            report.outcomes.push(StageOutcome { stage, error: None });
            Some(value)
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(job = %report.job, %stage, error = %message, "stage failed");
            report.outcomes.push(StageOutcome {
                stage,
                error: Some(message),
            });
            None
        }
    }
}

/// Append the failure marker to `error.txt` inside `directory`.
pub fn record_failure_marker(directory: &Path) -> Result<PathBuf> {
    let path = directory.join(ERROR_MARKER_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Unable to open failure marker {}", path.display()))?;
    file.write_all(ERROR_MARKER_TEXT.as_bytes())
        .with_context(|| format!("Failed to write failure marker {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn failed_stage_does_not_stop_later_stages() {
        let mut report = JobReport::new("job1");
        let loaded = run_stage(&mut report, JobStage::Load, || Ok(3));
        let diffusion: Option<f64> =
            run_stage(&mut report, JobStage::Diffusion, || Err(anyhow!("no frames")));
        let exported = run_stage(&mut report, JobStage::Export, || Ok(()));

        assert_eq!(loaded, Some(3));
        assert!(diffusion.is_none());
        assert!(exported.is_some());
        assert!(report.failed());
        assert_eq!(report.failed_stages(), vec![JobStage::Diffusion]);
        assert_eq!(report.outcomes[1].error.as_deref(), Some("no frames"));
    }

    #[test]
    fn marker_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        record_failure_marker(dir.path()).unwrap();
        let path = record_failure_marker(dir.path()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "error in analysiserror in analysis");
    }
}
