//! Sensor calibration: differential ADC counts to °C.

/// Degree-5 fit of the chip's thermistor bridge, ascending powers.
pub const DEFAULT_COEFFS: [f64; 6] = magi_config::DEFAULT_CALIBRATION;

/// Polynomial calibration `a0 + a1·d + … + a5·d⁵`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Ascending powers: `coeffs[k]` multiplies `d^k`.
    pub coeffs: [f64; 6],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            coeffs: DEFAULT_COEFFS,
        }
    }
}

impl Calibration {
    pub fn new(coeffs: [f64; 6]) -> Self {
        Self { coeffs }
    }

    /// Temperature in °C for a differential reading in ADC counts.
    #[inline]
    pub fn to_celsius(&self, diff_counts: f64) -> f64 {
        self.coeffs
            .iter()
            .rev()
            .fold(0.0, |acc, &a| acc.mul_add(diff_counts, a))
    }
}

/// Calibrate with the instrument's fitted coefficients.
#[inline]
pub fn calibrate(diff_counts: f64) -> f64 {
    Calibration::default().to_celsius(diff_counts)
}
