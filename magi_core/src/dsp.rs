//! Butterworth low-pass design and zero-phase filtering in second-order
//! sections.
//!
//! Frequencies are normalized to Nyquist (`wn = 1` is Nyquist). Each section
//! is a biquad
//! ```text
//! H(z) = (b0 + b1·z⁻¹ + b2·z⁻²) / (1 + a1·z⁻¹ + a2·z⁻²)
//! ```
//! run in transposed direct form II. Sections are built from conjugate pole
//! pairs with unity DC gain each, so the cascade has unity DC gain too.

use core::f64::consts::PI;

use crate::error::MagiError;

/// One second-order section; `a[0]` is always 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// DC gain, `H(1)`.
    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Filter state after an infinitely long unit step.
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        let z1 = self.b[2] - self.a[2] * g;
        [g - self.b[0], z1]
    }
}

/// Cascade of second-order sections.
#[derive(Debug, Clone, PartialEq)]
pub struct Sos {
    pub sections: Vec<Biquad>,
}

/// Digital Butterworth low-pass of `order`, cutoff `wn` in (0, 1) of Nyquist.
///
/// Analog prototype poles are scaled to the pre-warped cutoff and mapped with
/// the bilinear transform at `fs = 2`; all zeros land at `z = -1`.
pub fn butter_lowpass(order: usize, wn: f64) -> Result<Sos, MagiError> {
    if order == 0 {
        return Err(MagiError::Config("filter order must be >= 1".into()));
    }
    if !(wn > 0.0 && wn < 1.0) {
        return Err(MagiError::Config(format!(
            "cutoff must be in (0, 1) of Nyquist, got {wn}"
        )));
    }

    let warped = 4.0 * (PI * wn / 2.0).tan();
    let mut sections = Vec::with_capacity(order.div_ceil(2));
    for k in 0..order.div_ceil(2) {
        let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
        let (sr, si) = (warped * theta.cos(), warped * theta.sin());

        // z = (4 + s) / (4 - s)
        let den = (4.0 - sr).powi(2) + si * si;
        let zr = (16.0 - sr * sr - si * si) / den;
        let zi = 8.0 * si / den;

        let section = if 2 * k + 1 == order {
            // Real pole left over for odd orders.
            let g = (1.0 - zr) / 2.0;
            Biquad {
                b: [g, g, 0.0],
                a: [1.0, -zr, 0.0],
            }
        } else {
            let a1 = -2.0 * zr;
            let a2 = zr * zr + zi * zi;
            let g = (1.0 + a1 + a2) / 4.0;
            Biquad {
                b: [g, 2.0 * g, g],
                a: [1.0, a1, a2],
            }
        };
        sections.push(section);
    }
    Ok(Sos { sections })
}

impl Sos {
    /// Steady-state section states for a unit step, scaled by the DC gain
    /// of the sections before each one.
    pub fn step_states(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let [z0, z1] = s.step_state();
                let zi = [scale * z0, scale * z1];
                scale *= s.dc_gain();
                zi
            })
            .collect()
    }

    /// Causal filtering; `state` holds one `[z0, z1]` per section and is
    /// updated in place.
    pub fn filter(&self, x: &[f64], state: &mut [[f64; 2]]) -> Vec<f64> {
        debug_assert_eq!(state.len(), self.sections.len());
        x.iter()
            .map(|&input| {
                let mut v = input;
                for (s, z) in self.sections.iter().zip(state.iter_mut()) {
                    let y = s.b[0] * v + z[0];
                    z[0] = s.b[1] * v - s.a[1] * y + z[1];
                    z[1] = s.b[2] * v - s.a[2] * y;
                    v = y;
                }
                v
            })
            .collect()
    }

    /// Edge padding used by `filtfilt` for a signal of length `n`.
    pub fn padlen(&self, n: usize) -> usize {
        let first_order = self
            .sections
            .iter()
            .filter(|s| s.b[2] == 0.0 && s.a[2] == 0.0)
            .count();
        let ntaps = 2 * self.sections.len() + 1 - first_order;
        (3 * ntaps).min(n.saturating_sub(1))
    }

    /// Forward-backward filtering with odd-extension padding and steady-state
    /// initial conditions. Output has zero phase and the input's length.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n < 2 {
            return x.to_vec();
        }
        let edge = self.padlen(n);
        let (first, last) = (x[0], x[n - 1]);

        let mut ext = Vec::with_capacity(n + 2 * edge);
        ext.extend((1..=edge).rev().map(|i| 2.0 * first - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=edge).map(|i| 2.0 * last - x[n - 1 - i]));

        let zi = self.step_states();
        let scaled = |v: f64| zi.iter().map(|z| [z[0] * v, z[1] * v]).collect::<Vec<_>>();

        let mut state = scaled(ext[0]);
        let mut y = self.filter(&ext, &mut state);
        y.reverse();
        let mut state = scaled(y[0]);
        let mut y = self.filter(&y, &mut state);
        y.reverse();

        y.drain(..edge);
        y.truncate(n);
        y
    }
}
