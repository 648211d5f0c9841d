use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Run phase that ends at the start of the isothermal hold.
pub const DEFAULT_HOLD_PHASE: usize = 5;

/// Parameters taken from a job's simulation input.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobParameters {
    /// Integration timestep (ps per step).
    pub timestep: f64,
    /// Step count of each run phase, in order.
    pub runsteps: Vec<u64>,
    /// Species labels in particle-type order.
    pub elements: Vec<String>,
    #[serde(default)]
    pub trajdumprate: Option<u64>,
    /// Number of leading run phases that precede the analysed hold.
    #[serde(default = "default_hold_phase")]
    pub hold_phase: usize,
}

fn default_hold_phase() -> usize {
    DEFAULT_HOLD_PHASE
}

impl JobParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.timestep > 0.0) {
            return Err(AnalysisError::invalid(format!(
                "timestep must be positive, got {}",
                self.timestep
            )));
        }
        if self.elements.is_empty() {
            return Err(AnalysisError::invalid("job lists no elements"));
        }
        if self.hold_phase > self.runsteps.len() {
            return Err(AnalysisError::invalid(format!(
                "hold phase {} exceeds the {} configured run phases",
                self.hold_phase,
                self.runsteps.len()
            )));
        }
        Ok(())
    }

    /// First timestep of the analysed hold.
    pub fn hold_start(&self) -> u64 {
        self.runsteps.iter().take(self.hold_phase).sum()
    }
}

/// Frames selected for analysis and their times relative to the first one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameWindow {
    pub frames: Vec<usize>,
    pub times: Vec<f64>,
}

impl FrameWindow {
    pub fn new(frames: Vec<usize>, times: Vec<f64>) -> Result<Self> {
        if frames.len() != times.len() {
            return Err(AnalysisError::invalid(format!(
                "{} frames supplied with {} times",
                frames.len(),
                times.len()
            )));
        }
        Ok(Self { frames, times })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Pair the first half of the window (origins) with the second half (endings).
    ///
    /// Both halves hold `len / 2` positions; an odd trailing frame is dropped.
    pub fn split_origins(&self) -> (Vec<usize>, Vec<usize>) {
        let number = self.len() / 2;
        let origins = (0..number).collect();
        let endings = (number..2 * number).collect();
        (origins, endings)
    }
}

/// Window of frames at or after the start of the hold.
///
/// `steps` holds the timestep of every recorded frame, in frame order.
pub fn hold_window(steps: &[u64], params: &JobParameters) -> Result<FrameWindow> {
    params.validate()?;
    if let Some(position) = steps.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(AnalysisError::invalid(format!(
            "timesteps must increase strictly, but frame {} (step {}) follows step {}",
            position + 1,
            steps[position + 1],
            steps[position]
        )));
    }
    let cutoff = params.hold_start();

    let frames: Vec<usize> = steps
        .iter()
        .enumerate()
        .filter(|(_, step)| **step >= cutoff)
        .map(|(index, _)| index)
        .collect();

    let first = frames
        .first()
        .map(|&index| steps[index])
        .ok_or_else(|| {
            AnalysisError::invalid(format!("no frames recorded at or after step {cutoff}"))
        })?;

    let times = frames
        .iter()
        .map(|&index| (steps[index] - first) as f64 * params.timestep)
        .collect();

    FrameWindow::new(frames, times)
}
