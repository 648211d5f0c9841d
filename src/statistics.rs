//! Autocovariance, autocorrelation and batch-means error for correlated series.
//!
//! All functions are pure and fail fast: zero-variance input surfaces as
//! [`AnalysisError::DegenerateData`] instead of NaN.

use crate::error::{AnalysisError, Result};
use crate::series::{even_split, mean, sample_variance};

/// Autocovariance at `lag`, normalized by `n - bias`.
///
/// `bias = 0.0` gives the population-style estimator.
pub fn autocovariance(series: &[f64], lag: usize, bias: f64) -> Result<f64> {
    let n = series.len();
    if n == 0 {
        return Err(AnalysisError::invalid("autocovariance of an empty series"));
    }
    if lag >= n {
        return Err(AnalysisError::invalid(format!(
            "lag {lag} must be smaller than the series length {n}"
        )));
    }
    let denominator = n as f64 - bias;
    if denominator <= 0.0 {
        return Err(AnalysisError::invalid(format!(
            "bias {bias} leaves a non-positive normalization for {n} values"
        )));
    }

    let m = mean(series)?;
    Ok(lagged_sum(series, m, lag) / denominator)
}

fn lagged_sum(series: &[f64], mean: f64, lag: usize) -> f64 {
    series
        .iter()
        .zip(series.iter().skip(lag))
        .map(|(x_t, x_t_k)| (x_t_k - mean) * (x_t - mean))
        .sum()
}

/// Autocorrelation for every lag `0..=n`.
///
/// The lag-`n` entry is an empty sum and therefore exactly zero.
pub fn autocorrelation(series: &[f64]) -> Result<Vec<f64>> {
    let n = series.len();
    let variance = autocovariance(series, 0, 0.0)?;
    let constant = series.iter().all(|&value| value == series[0]);
    if constant || variance == 0.0 {
        return Err(AnalysisError::degenerate(
            "autocorrelation of a zero-variance series",
        ));
    }

    let m = mean(series)?;
    let mut acf = Vec::with_capacity(n + 1);
    acf.push(1.0);
    for lag in 1..n {
        acf.push(lagged_sum(series, m, lag) / n as f64 / variance);
    }
    acf.push(0.0);
    Ok(acf)
}

/// First lag whose autocorrelation is non-positive.
///
/// When the autocorrelation never reaches zero, the whole series is treated
/// as one correlated block and the series length is returned.
pub fn decorrelation_length(acf: &[f64]) -> usize {
    acf.iter()
        .position(|&value| value <= 0.0)
        .unwrap_or_else(|| acf.len().saturating_sub(1).max(1))
}

/// Standard error of the mean estimated from block averages.
///
/// The series is cut into `len / correlation_length` bins (at least one).
pub fn batch_means_error(series: &[f64], correlation_length: usize) -> Result<f64> {
    if correlation_length == 0 {
        return Err(AnalysisError::invalid("correlation length must be positive"));
    }
    if series.is_empty() {
        return Err(AnalysisError::degenerate("batch means of an empty series"));
    }

    let bins = (series.len() / correlation_length).max(1);
    if bins < 2 {
        return Err(AnalysisError::degenerate(format!(
            "correlation length {correlation_length} leaves a single batch for {} values",
            series.len()
        )));
    }

    let means = even_split(series, bins)?
        .into_iter()
        .map(mean)
        .collect::<Result<Vec<f64>>>()?;
    let variance = sample_variance(&means)?;
    Ok((variance / bins as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: [f64; 12] = [1.0, 3.0, 2.0, 5.0, 4.0, 6.0, 2.0, 8.0, 3.0, 7.0, 1.0, 4.0];

    #[test]
    fn constant_series_has_zero_variance_and_no_acf() {
        let constant = [4.25; 16];
        assert_eq!(autocovariance(&constant, 0, 0.0).unwrap(), 0.0);
        assert!(matches!(
            autocorrelation(&constant),
            Err(AnalysisError::DegenerateData(_))
        ));
    }

    #[test]
    fn acf_starts_at_exactly_one() {
        let acf = autocorrelation(&SAMPLE).unwrap();
        assert_eq!(acf.len(), SAMPLE.len() + 1);
        assert_eq!(acf[0], 1.0);
        assert_eq!(acf[SAMPLE.len()], 0.0);
    }

    #[test]
    fn autocovariance_rejects_out_of_range_lag() {
        assert!(matches!(
            autocovariance(&SAMPLE, SAMPLE.len(), 0.0),
            Err(AnalysisError::InvalidArgument(_))
        ));
        assert!(matches!(
            autocovariance(&[1.0, 2.0], 0, 2.0),
            Err(AnalysisError::InvalidArgument(_))
        ));
    }

    #[test]
    fn bias_changes_normalization_only() {
        let population = autocovariance(&SAMPLE, 1, 0.0).unwrap();
        let sample = autocovariance(&SAMPLE, 1, 1.0).unwrap();
        let n = SAMPLE.len() as f64;
        assert_relative_eq!(sample, population * n / (n - 1.0), epsilon = 1e-12);
    }

    #[test]
    fn alternating_series_decorrelates_at_first_lag() {
        let alternating = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let acf = autocorrelation(&alternating).unwrap();
        assert_eq!(decorrelation_length(&acf), 1);
    }

    #[test]
    fn trend_decorrelates_late() {
        let trend: Vec<f64> = (0..20).map(f64::from).collect();
        let acf = autocorrelation(&trend).unwrap();
        let k = decorrelation_length(&acf);
        assert!(k > 1 && k <= trend.len());
    }

    #[test]
    fn positive_acf_falls_back_to_whole_series() {
        assert_eq!(decorrelation_length(&[1.0, 0.8, 0.5, 0.2]), 3);
    }

    #[test]
    fn batch_means_matches_hand_computation() {
        // bins of 2 → means 2, 3.5, 5, 5, 5, 2.5
        let means = [2.0, 3.5, 5.0, 5.0, 5.0, 2.5];
        let expected = (sample_variance(&means).unwrap() / 6.0).sqrt();
        assert_relative_eq!(batch_means_error(&SAMPLE, 2).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn batch_means_is_shift_invariant_and_scale_linear() {
        let base = batch_means_error(&SAMPLE, 2).unwrap();
        let shifted: Vec<f64> = SAMPLE.iter().map(|v| v + 100.0).collect();
        let scaled: Vec<f64> = SAMPLE.iter().map(|v| v * 3.0).collect();
        assert_relative_eq!(batch_means_error(&shifted, 2).unwrap(), base, epsilon = 1e-9);
        assert_relative_eq!(batch_means_error(&scaled, 2).unwrap(), 3.0 * base, epsilon = 1e-9);
    }

    #[test]
    fn batch_means_rejects_zero_length_and_single_batch() {
        assert!(matches!(
            batch_means_error(&SAMPLE, 0),
            Err(AnalysisError::InvalidArgument(_))
        ));
        assert!(batch_means_error(&SAMPLE, SAMPLE.len()).unwrap_err().is_degenerate());
        assert!(batch_means_error(&SAMPLE, 50).unwrap_err().is_degenerate());
    }

    #[test]
    fn kernel_is_bit_identical_across_calls() {
        assert_eq!(autocorrelation(&SAMPLE).unwrap(), autocorrelation(&SAMPLE).unwrap());
        assert_eq!(
            batch_means_error(&SAMPLE, 3).unwrap().to_bits(),
            batch_means_error(&SAMPLE, 3).unwrap().to_bits()
        );
    }
}
