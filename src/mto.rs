//! Self-diffusion from multiple time origins (MTO).
//!
//! The analysed window is split in half: each frame of the first half is a
//! time origin and the frame at the same offset in the second half is its
//! ending. Every origin yields one diffusion coefficient per species from the
//! slope of its MSD curve. The per-origin series is then trimmed to its
//! settled part, and its mean is reported with two error bars: the standard
//! error of the mean and the batch-means error at the decorrelation length.

use serde::Serialize;
use tracing::{info, warn};

use crate::diffusion::self_diffusion;
use crate::error::{AnalysisError, Result};
use crate::job::FrameWindow;
use crate::provider::{ALL_LABEL, DisplacementProvider};
use crate::series::{TimeSeries, mean, standard_error};
use crate::settling::settle;
use crate::statistics::{autocorrelation, batch_means_error, decorrelation_length};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeOrigin {
    pub origin_frame: usize,
    pub ending_frame: usize,
    /// Time of the origin relative to the window start.
    pub start: f64,
    /// Time of the ending relative to the window start.
    pub stop: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffusionEstimate {
    pub label: String,
    pub diffusion: f64,
    pub sem: f64,
    pub batch: f64,
    /// Per-origin values that survived settling.
    pub settled_count: usize,
    /// Decorrelation lag of the settled series, when defined.
    pub correlation_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MtoReport {
    pub significance_level: f64,
    pub origins: Vec<TimeOrigin>,
    /// One row per origin: a column per label, then `start` and `stop`.
    pub raw: Table,
    /// Settled values per label, NaN-padded to the longest column.
    pub settled: Table,
    pub estimates: Vec<DiffusionEstimate>,
}

impl MtoReport {
    pub fn estimate(&self, label: &str) -> Option<&DiffusionEstimate> {
        self.estimates.iter().find(|e| e.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.estimates.iter().map(|e| e.label.as_str()).collect()
    }
}

/// Output labels: the aggregate column first, then species in caller order.
pub fn column_labels(species_labels: &[String]) -> Vec<String> {
    let mut labels = vec![ALL_LABEL.to_string()];
    for label in species_labels {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels
}

/// Run the full MTO estimate over `window`.
///
/// Any failure while processing an origin aborts the whole estimate.
/// Statistics that are undefined for a label (nothing settled, a constant
/// settled series, a single batch) are reported as NaN.
pub fn estimate_diffusion<P>(
    provider: &P,
    window: &FrameWindow,
    species_labels: &[String],
    significance_level: f64,
) -> Result<MtoReport>
where
    P: DisplacementProvider + ?Sized,
{
    if !(significance_level > 0.0 && significance_level < 1.0) {
        return Err(AnalysisError::invalid(format!(
            "significance level must lie in (0, 1), got {significance_level}"
        )));
    }
    if window.frames.len() != window.times.len() {
        return Err(AnalysisError::invalid(
            "frame window has mismatched frames and times",
        ));
    }

    let labels = column_labels(species_labels);
    let (origins, endings) = window.split_origins();
    let number = origins.len();
    if number < 2 {
        return Err(AnalysisError::invalid(format!(
            "{} frames leave {number} time origins; at least 4 frames are needed",
            window.len()
        )));
    }

    let mut per_label: Vec<TimeSeries> = labels
        .iter()
        .map(|_| TimeSeries::with_capacity(number))
        .collect();
    let mut time_origins = Vec::with_capacity(number);

    for (count, (&origin, &ending)) in origins.iter().zip(&endings).enumerate() {
        info!(
            "[mto] time origin {}/{} (frame {})",
            count + 1,
            number,
            window.frames[origin]
        );

        let values = origin_diffusion(provider, window, origin, ending, &labels)?;
        for (series, value) in per_label.iter_mut().zip(values) {
            series.push(window.times[origin], value);
        }
        time_origins.push(TimeOrigin {
            origin_frame: window.frames[origin],
            ending_frame: window.frames[ending],
            start: window.times[origin],
            stop: window.times[ending],
        });
    }

    let mut raw = Table::new(labels.iter().cloned().chain(["start".into(), "stop".into()]));
    for (row, origin) in time_origins.iter().enumerate() {
        let mut values: Vec<f64> = per_label.iter().map(|s| s.values[row]).collect();
        values.push(origin.start);
        values.push(origin.stop);
        raw.push_row(values)?;
    }

    let mut estimates = Vec::with_capacity(labels.len());
    let mut settled_columns = Vec::with_capacity(labels.len());
    for (label, series) in labels.iter().zip(&per_label) {
        let (estimate, settled) = summarize_label(label, &series.values, significance_level)?;
        estimates.push(estimate);
        settled_columns.push((label.clone(), settled));
    }

    Ok(MtoReport {
        significance_level,
        origins: time_origins,
        raw,
        settled: Table::from_ragged_columns(settled_columns),
        estimates,
    })
}

/// Diffusion coefficient of every label for one origin.
fn origin_diffusion<P>(
    provider: &P,
    window: &FrameWindow,
    origin: usize,
    ending: usize,
    labels: &[String],
) -> Result<Vec<f64>>
where
    P: DisplacementProvider + ?Sized,
{
    let reference = window.frames[origin];
    let mut lags = Vec::with_capacity(ending - origin);
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(ending - origin); labels.len()];

    // The origin row is zero by construction and is left out of the fit.
    for position in origin + 1..=ending {
        let msd = provider.msd(reference, window.frames[position])?;
        lags.push(window.times[position] - window.times[origin]);
        for (column, label) in columns.iter_mut().zip(labels) {
            column.push(msd.require(label)?);
        }
    }

    columns
        .iter()
        .map(|column| self_diffusion(&lags, column))
        .collect()
}

fn summarize_label(
    label: &str,
    values: &[f64],
    significance_level: f64,
) -> Result<(DiffusionEstimate, Vec<f64>)> {
    let settled = match settle(values, significance_level) {
        Ok(settling) => settling.values,
        // A constant series has no transient to discard.
        Err(err) if err.is_degenerate() => values.to_vec(),
        Err(err) => return Err(err),
    };

    if settled.is_empty() {
        warn!(label, "no per-origin values settled; reporting NaN");
        let estimate = DiffusionEstimate {
            label: label.to_string(),
            diffusion: f64::NAN,
            sem: f64::NAN,
            batch: f64::NAN,
            settled_count: 0,
            correlation_length: None,
        };
        return Ok((estimate, settled));
    }

    let diffusion = nan_if_degenerate(label, "diffusion", mean(&settled))?;
    let sem = nan_if_degenerate(label, "sem", standard_error(&settled))?;

    let correlation_length = match autocorrelation(&settled) {
        Ok(acf) => Some(decorrelation_length(&acf)),
        Err(err) if err.is_degenerate() => {
            warn!(label, error = %err, "settled series has no autocorrelation");
            None
        }
        Err(err) => return Err(err),
    };
    let batch = match correlation_length {
        Some(k) => nan_if_degenerate(label, "batch", batch_means_error(&settled, k))?,
        None => f64::NAN,
    };

    let estimate = DiffusionEstimate {
        label: label.to_string(),
        diffusion,
        sem,
        batch,
        settled_count: settled.len(),
        correlation_length,
    };
    Ok((estimate, settled))
}

fn nan_if_degenerate(label: &str, quantity: &str, result: Result<f64>) -> Result<f64> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if err.is_degenerate() => {
            warn!(label, quantity, error = %err, "statistic undefined; reporting NaN");
            Ok(f64::NAN)
        }
        Err(err) => Err(err),
    }
}
