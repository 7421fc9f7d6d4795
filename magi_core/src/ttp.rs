//! Time-to-positive from a normalized curve.
//!
//! The TTP is where the tangent at the curve's midpoint (first sample above
//! 0.5) meets the time axis. The tangent is a least-squares line through the
//! midpoint and two samples on either side.

/// Returned when no valid TTP exists for a curve.
pub const TTP_NOT_DETECTED: f64 = -0.001;

/// Samples on each side of the midpoint used for the tangent fit.
const HALF_WINDOW: usize = 2;

/// TTP in the units of `t`, or [`TTP_NOT_DETECTED`].
///
/// No TTP is reported when the curve never exceeds 0.5, when the crossing is
/// too close to either end for a full window, or when the fitted line is flat
/// or meets the axis before `t = 0`.
pub fn time_to_positive(t: &[f64], y: &[f64]) -> f64 {
    let n = t.len().min(y.len());
    let Some(idx) = y[..n].iter().position(|&v| v > 0.5) else {
        return TTP_NOT_DETECTED;
    };
    if idx < HALF_WINDOW || idx + HALF_WINDOW >= n {
        return TTP_NOT_DETECTED;
    }

    let window = idx - HALF_WINDOW..=idx + HALF_WINDOW;
    let (slope, intercept) = fit_line(&t[window.clone()], &y[window]);
    let ttp = -intercept / slope;
    if slope == 0.0 || !ttp.is_finite() || ttp < 0.0 {
        return TTP_NOT_DETECTED;
    }
    ttp
}

/// Ordinary least squares `y = slope·x + intercept`.
fn fit_line(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (sxy, sxx) = x.iter().zip(y).fold((0.0, 0.0), |(sxy, sxx), (&xi, &yi)| {
        let dx = xi - mx;
        (sxy + dx * (yi - my), sxx + dx * dx)
    });
    let slope = sxy / sxx;
    (slope, my - slope * mx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn linear_ramp_extrapolates_to_its_root() {
        // y = 0.1·(t - 3) for t >= 3
        let t = axis(20);
        let y: Vec<f64> = t.iter().map(|&x| (0.1 * (x - 3.0)).clamp(0.0, 1.0)).collect();
        let ttp = time_to_positive(&t, &y);
        assert!((ttp - 3.0).abs() < 1e-9, "{ttp}");
    }

    #[rstest]
    #[case::crossing_at_index_one(vec![0.0, 0.6, 0.8, 0.9, 1.0, 1.0])]
    #[case::crossing_at_last_sample(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.9])]
    #[case::one_before_last(vec![0.0, 0.1, 0.2, 0.3, 0.7, 1.0])]
    #[case::never_crosses(vec![0.0, 0.1, 0.5, 0.3, 0.2, 0.1])]
    #[case::flat_zero(vec![0.0; 8])]
    fn boundary_and_degenerate_curves_report_sentinel(#[case] y: Vec<f64>) {
        let t = axis(y.len());
        assert_eq!(time_to_positive(&t, &y), TTP_NOT_DETECTED);
    }

    #[test]
    fn crossing_at_index_two_is_accepted() {
        let t = axis(6);
        let y = [0.0, 0.1, 0.6, 0.9, 1.0, 1.0];
        let ttp = time_to_positive(&t, &y);
        assert!(ttp >= 0.0 && ttp < 2.0, "{ttp}");
    }
}
