//! Steady-state detection for per-origin series.
//!
//! The series is cut into blocks one decorrelation length long. The last
//! block is taken as the settled reference; every block whose mean cannot be
//! told apart from it by a two-sided Welch t-test is kept.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::series::{even_split, mean};
use crate::statistics::{autocorrelation, decorrelation_length};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settling {
    /// Retained values, in their original order.
    pub values: Vec<f64>,
    pub correlation_length: usize,
    pub bin_count: usize,
    /// Two-sided p-value of each block against the final block.
    pub p_values: Vec<f64>,
}

impl Settling {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn settle(series: &[f64], significance_level: f64) -> Result<Settling> {
    if !(significance_level > 0.0 && significance_level < 1.0) {
        return Err(AnalysisError::invalid(format!(
            "significance level must lie in (0, 1), got {significance_level}"
        )));
    }

    let acf = autocorrelation(series)?;
    let correlation_length = decorrelation_length(&acf);
    let bin_count = (series.len() / correlation_length).max(1);
    let bins = even_split(series, bin_count)?;

    let reference = bins[bins.len() - 1];
    let p_values = bins
        .iter()
        .map(|bin| welch_p_value(bin, reference))
        .collect::<Result<Vec<f64>>>()?;

    let mut values = Vec::with_capacity(series.len());
    for (bin, p_value) in bins.iter().zip(&p_values) {
        if *p_value >= significance_level {
            values.extend_from_slice(bin);
        }
    }

    debug!(
        correlation_length,
        bin_count,
        kept = values.len(),
        total = series.len(),
        "settling test finished"
    );

    Ok(Settling {
        values,
        correlation_length,
        bin_count,
        p_values,
    })
}

/// Two-sided p-value of Welch's unequal-variance t-test.
///
/// A one-element sample contributes zero variance. When both samples have
/// zero variance the test degenerates to an equality check of the means.
pub fn welch_p_value(sample: &[f64], reference: &[f64]) -> Result<f64> {
    let (mean_a, var_a) = mean_and_variance(sample)?;
    let (mean_b, var_b) = mean_and_variance(reference)?;

    let se_a = var_a / sample.len() as f64;
    let se_b = var_b / reference.len() as f64;
    let se_sum = se_a + se_b;

    if se_sum == 0.0 {
        return Ok(if mean_a == mean_b { 1.0 } else { 0.0 });
    }

    let t = (mean_a - mean_b) / se_sum.sqrt();

    // Welch–Satterthwaite; zero-variance samples drop out of the denominator.
    let mut dof_denominator = 0.0;
    if se_a > 0.0 {
        dof_denominator += se_a * se_a / (sample.len() - 1) as f64;
    }
    if se_b > 0.0 {
        dof_denominator += se_b * se_b / (reference.len() - 1) as f64;
    }
    let dof = se_sum * se_sum / dof_denominator;

    let distribution = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| AnalysisError::invalid(format!("Student t with {dof} dof: {e}")))?;
    let p = 2.0 * (1.0 - distribution.cdf(t.abs()));
    Ok(p.clamp(0.0, 1.0))
}

fn mean_and_variance(sample: &[f64]) -> Result<(f64, f64)> {
    let m = mean(sample)?;
    if sample.len() < 2 {
        return Ok((m, 0.0));
    }
    let sum_sq: f64 = sample.iter().map(|v| (v - m) * (v - m)).sum();
    Ok((m, sum_sq / (sample.len() - 1) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn leading_outliers_are_dropped() {
        let mut series = vec![5.0; 5];
        series.extend(std::iter::repeat_n(1.0, 15));

        let settled = settle(&series, 0.05).unwrap();
        assert_eq!(settled.correlation_length, 5);
        assert_eq!(settled.bin_count, 4);
        assert_eq!(settled.values, vec![1.0; 15]);
        assert_eq!(settled.p_values, vec![0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn alternating_outliers_are_dropped() {
        let mut series = vec![9.0, -7.0, 8.0, -6.0, 10.0];
        series.extend(std::iter::repeat_n(1.0, 15));

        let settled = settle(&series, 0.05).unwrap();
        assert_eq!(settled.values, vec![1.0; 15]);
    }

    #[test]
    fn settled_values_are_a_subsequence() {
        let series = [5.0, 5.0, 1.02, 0.99, 1.015, 0.98, 1.01, 0.985, 1.005, 0.995];
        let settled = settle(&series, 0.05).unwrap();
        assert_eq!(settled.correlation_length, 2);
        assert_eq!(settled.values, series[2..].to_vec());
        assert!(settled.p_values[0] < 0.05);
    }

    #[test]
    fn constant_series_is_degenerate() {
        assert!(settle(&[3.0; 10], 0.05).unwrap_err().is_degenerate());
    }

    #[test]
    fn significance_level_is_validated() {
        let series = [1.0, 2.0, 3.0];
        for alpha in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                settle(&series, alpha),
                Err(AnalysisError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn welch_matches_reference_value() {
        // t ≈ -2.074 with ≈ 10.21 degrees of freedom
        let a = [19.8, 20.4, 19.6, 17.8, 18.5, 18.9, 18.3, 18.9, 19.5, 22.0];
        let b = [28.2, 26.6, 20.1, 23.3, 25.2, 22.1, 17.7, 27.6, 20.6, 13.7];
        let p = welch_p_value(&a, &b).unwrap();
        assert_relative_eq!(p, 0.0643, epsilon = 5e-4);
    }

    #[test]
    fn identical_samples_give_unit_p_value() {
        let a = [1.0, 2.0, 3.0];
        assert_relative_eq!(welch_p_value(&a, &a).unwrap(), 1.0, epsilon = 1e-12);
    }
}
