use crate::error::{AnalysisError, Result};

/// Spatial dimensions of the simulation cell.
pub const DIMENSIONS: usize = 3;

/// Einstein relation: MSD(t) = 2 * d * D * t.
pub const EINSTEIN_FACTOR: f64 = 2.0 * DIMENSIONS as f64;

/// Ordinary least-squares fit of `y` against `x`, returning `(slope, intercept)`.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    if x.len() != y.len() {
        return Err(AnalysisError::invalid(format!(
            "regression needs matching lengths, got {} and {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(AnalysisError::invalid(format!(
            "regression needs at least 2 points, got {}",
            x.len()
        )));
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        sxx += dx * dx;
        sxy += dx * (yi - mean_y);
    }

    if sxx == 0.0 || x.iter().all(|&xi| xi == x[0]) {
        return Err(AnalysisError::invalid(
            "regression abscissa values are all identical",
        ));
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    Ok((slope, intercept))
}

/// Self-diffusion coefficient from the slope of an MSD curve.
///
/// Units follow the inputs: Å² and ps give 10⁻⁴ cm² s⁻¹.
pub fn self_diffusion(times: &[f64], msd: &[f64]) -> Result<f64> {
    let (slope, _) = linear_regression(times, msd)?;
    Ok(slope / EINSTEIN_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unit_slope_over_six() {
        let d = self_diffusion(&[0.0, 1.0, 2.0, 3.0], &[0.0, 6.0, 12.0, 18.0]).unwrap();
        assert_eq!(d, 1.0);
    }

    #[test]
    fn intercept_does_not_bias_slope() {
        let times = [0.5, 1.0, 1.5, 2.0, 2.5];
        let msd: Vec<f64> = times.iter().map(|t| 0.3 + 12.0 * t).collect();
        let (slope, intercept) = linear_regression(&times, &msd).unwrap();
        assert_relative_eq!(slope, 12.0, epsilon = 1e-12);
        assert_relative_eq!(intercept, 0.3, epsilon = 1e-12);
        assert_relative_eq!(self_diffusion(&times, &msd).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert!(matches!(
            self_diffusion(&[1.0], &[1.0]),
            Err(AnalysisError::InvalidArgument(_))
        ));
        assert!(matches!(
            self_diffusion(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]),
            Err(AnalysisError::InvalidArgument(_))
        ));
        assert!(matches!(
            self_diffusion(&[0.0, 1.0], &[1.0]),
            Err(AnalysisError::InvalidArgument(_))
        ));
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let times = [0.1, 0.2, 0.3, 0.4];
        let msd = [0.7, 1.9, 2.2, 3.1];
        let first = self_diffusion(&times, &msd).unwrap();
        let second = self_diffusion(&times, &msd).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }
}
