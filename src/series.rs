use serde::Serialize;

use crate::error::{AnalysisError, Result};

/// Ordered (time, value) samples. Insertion order is time order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn from_parts(times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(AnalysisError::invalid(format!(
                "time series needs matching lengths, got {} times and {} values",
                times.len(),
                values.len()
            )));
        }
        Ok(Self { times, values })
    }

    pub fn push(&mut self, time: f64, value: f64) {
        self.times.push(time);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Split `values` into `bins` contiguous chunks of nearly equal size.
///
/// The first `len % bins` chunks carry one extra element so nothing is dropped.
pub fn even_split(values: &[f64], bins: usize) -> Result<Vec<&[f64]>> {
    if bins == 0 {
        return Err(AnalysisError::invalid("bin count must be positive"));
    }
    if bins > values.len() {
        return Err(AnalysisError::invalid(format!(
            "cannot split {} values into {} bins",
            values.len(),
            bins
        )));
    }

    let base = values.len() / bins;
    let extra = values.len() % bins;
    let mut chunks = Vec::with_capacity(bins);
    let mut start = 0;
    for index in 0..bins {
        let size = if index < extra { base + 1 } else { base };
        chunks.push(&values[start..start + size]);
        start += size;
    }
    Ok(chunks)
}

pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(AnalysisError::degenerate("mean of an empty series"));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance with one degree of freedom removed.
pub fn sample_variance(values: &[f64]) -> Result<f64> {
    if values.len() < 2 {
        return Err(AnalysisError::degenerate(format!(
            "sample variance needs at least 2 values, got {}",
            values.len()
        )));
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Ok(sum_sq / (values.len() - 1) as f64)
}

/// Standard error of the mean: sample standard deviation over sqrt(n).
pub fn standard_error(values: &[f64]) -> Result<f64> {
    let variance = sample_variance(values)?;
    Ok((variance / values.len() as f64).sqrt())
}
