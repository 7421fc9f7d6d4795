//! One-pole setpoint pre-filter.

/// Memory of the setpoint pre-filter.
///
/// Seeded once per process; survives controller stop/start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreFilterState {
    pub previous: f64,
}

impl PreFilterState {
    pub fn new(initial_c: f64) -> Self {
        Self { previous: initial_c }
    }
}

/// `filtered = a·previous + b·desired`; stores and returns `filtered`.
#[inline]
pub fn prefilter(desired: f64, state: &mut PreFilterState, a: f64, b: f64) -> f64 {
    let filtered = a * state.previous + b * desired;
    state.previous = filtered;
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const A: f64 = 0.999_949_127;
    const B: f64 = 0.000_050_873;

    #[test]
    fn converges_toward_desired() {
        let mut st = PreFilterState::new(23.0);
        let first = prefilter(63.0, &mut st, A, B);
        assert!(first > 23.0 && first < 23.01);
        for _ in 0..200_000 {
            prefilter(63.0, &mut st, A, B);
        }
        assert!((st.previous - 63.0).abs() < 0.01, "{}", st.previous);
    }

    proptest! {
        #[test]
        fn linear_in_the_input(
            xs in proptest::collection::vec(-100.0f64..100.0, 1..40),
            k in -10.0f64..10.0,
        ) {
            let mut s1 = PreFilterState::new(0.0);
            let mut s2 = PreFilterState::new(0.0);
            for &x in &xs {
                let y1 = prefilter(x, &mut s1, A, B);
                let y2 = prefilter(k * x, &mut s2, A, B);
                prop_assert!((k * y1 - y2).abs() <= 1e-9 * (1.0 + y2.abs()));
            }
        }

        #[test]
        fn time_invariant(x in -100.0f64..100.0, lead in 0usize..20) {
            // Zero input from zero state leaves the state at zero, so a
            // delayed impulse produces the same response, only later.
            let mut s1 = PreFilterState::new(0.0);
            let mut s2 = PreFilterState::new(0.0);
            for _ in 0..lead {
                prop_assert_eq!(prefilter(0.0, &mut s2, A, B), 0.0);
            }
            for i in 0..5 {
                let input = if i == 0 { x } else { 0.0 };
                prop_assert_eq!(prefilter(input, &mut s1, A, B), prefilter(input, &mut s2, A, B));
            }
        }
    }
}
