//! Per-well curve conditioning: warm-up cut, dropout repair, zero-phase
//! Butterworth smoothing, then shift and scale to [0, 1].

use serde::Serialize;

use crate::config::AnalysisParams;
use crate::dsp::{Sos, butter_lowpass};
use crate::error::{MagiError, Result};
use crate::store::RawWellSample;

/// Filter order of the smoothing low-pass.
pub const FILTER_ORDER: usize = 6;
/// Raw values below this are sensor dropouts.
pub const DROPOUT_FLOOR: f64 = 2.0;
/// Cutoff ceiling as a fraction of Nyquist.
const MAX_CUTOFF_RATIO: f64 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
}

/// Sampling figures the low-pass was designed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterDesign {
    pub samples: usize,
    /// Minutes from the first raw sample to the last retained one.
    pub span_min: f64,
    /// Samples per minute.
    pub sample_rate: f64,
    pub nyquist: f64,
    /// Cycles per minute.
    pub cutoff: f64,
}

impl FilterDesign {
    fn new(time_min: &[f64], filter_factor: f64) -> Result<Self> {
        let samples = time_min.len();
        if samples < 2 {
            return Err(MagiError::Data(format!(
                "need at least 2 samples after the warm-up cut, got {samples}"
            ))
            .into());
        }
        let span_min = time_min[samples - 1];
        if span_min.is_nan() || span_min <= 0.0 {
            return Err(MagiError::Data("samples span no time".into()).into());
        }
        let sample_rate = samples as f64 / span_min;
        let nyquist = sample_rate / 2.0;
        let mut cutoff = nyquist / filter_factor;
        if cutoff >= nyquist {
            cutoff = MAX_CUTOFF_RATIO * nyquist;
        }
        Ok(Self {
            samples,
            span_min,
            sample_rate,
            nyquist,
            cutoff,
        })
    }

    fn sos(&self) -> Result<Sos> {
        Ok(butter_lowpass(FILTER_ORDER, self.cutoff / self.nyquist)?)
    }
}

/// Output of the pipeline for every well of one raw file.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSet {
    /// Minutes since the first raw sample, retained samples only.
    pub time_min: Vec<f64>,
    /// One normalized curve per well, each `time_min.len()` long.
    pub curves: Vec<Vec<f64>>,
    pub design: FilterDesign,
}

impl FilteredSet {
    pub fn points(&self, well: usize) -> Vec<CurvePoint> {
        self.curves.get(well).map_or_else(Vec::new, |c| {
            self.time_min
                .iter()
                .zip(c)
                .map(|(&x, &y)| CurvePoint { x, y })
                .collect()
        })
    }
}

/// Replace each value below [`DROPOUT_FLOOR`] after the first with its
/// (already repaired) predecessor.
pub fn repair_dropouts(y: &mut [f64]) {
    for i in 1..y.len() {
        if y[i] < DROPOUT_FLOOR {
            y[i] = y[i - 1];
        }
    }
}

/// Subtract the minimum then divide by the resulting maximum. A flat curve
/// becomes all zeros.
pub fn normalize(y: &mut [f64]) {
    let min = y.iter().copied().fold(f64::INFINITY, f64::min);
    y.iter_mut().for_each(|v| *v -= min);
    let max = y.iter().copied().fold(0.0, f64::max);
    if max > 0.0 && max.is_finite() {
        y.iter_mut().for_each(|v| *v /= max);
    } else {
        y.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Run every well of `samples` through the pipeline.
pub fn filter_curves(
    samples: &[RawWellSample],
    wells: usize,
    params: &AnalysisParams,
) -> Result<FilteredSet> {
    params.validate()?;
    if wells == 0 {
        return Err(MagiError::Config("well layout has zero wells".into()).into());
    }
    let Some(first) = samples.first() else {
        return Err(MagiError::Data("no raw samples".into()).into());
    };
    if let Some((i, s)) = samples.iter().enumerate().find(|(_, s)| s.values.len() < wells) {
        return Err(MagiError::Data(format!(
            "sample {i} has {} values, layout needs {wells}",
            s.values.len()
        ))
        .into());
    }

    let t0 = first.timestamp;
    let retained: Vec<(f64, &RawWellSample)> = samples
        .iter()
        .map(|s| ((s.timestamp - t0) as f64 / 60.0, s))
        .filter(|(t, _)| *t >= params.cut_time_min)
        .collect();
    let time_min: Vec<f64> = retained.iter().map(|(t, _)| *t).collect();

    let design = FilterDesign::new(&time_min, params.filter_factor)?;
    let sos = design.sos()?;
    tracing::info!(
        n = design.samples,
        span_min = design.span_min,
        fs = design.sample_rate,
        nyquist = design.nyquist,
        cutoff = design.cutoff,
        "filter parameters"
    );

    let curves = (0..wells)
        .map(|well| {
            let mut raw: Vec<f64> = retained.iter().map(|(_, s)| s.values[well]).collect();
            repair_dropouts(&mut raw);
            let raw_max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            let mut y = sos.filtfilt(&raw);
            normalize(&mut y);
            if raw_max < params.threshold {
                tracing::debug!(well, raw_max, "below noise threshold");
                y.iter_mut().for_each(|v| *v = 0.0);
            }
            y
        })
        .collect();

    Ok(FilteredSet {
        time_min,
        curves,
        design,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn series(values: &[&[f64]], step_s: i64) -> Vec<RawWellSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| RawWellSample {
                timestamp: 1_000 + i as i64 * step_s,
                values: v.to_vec(),
            })
            .collect()
    }

    #[rstest]
    #[case(vec![5.0, 1.0, 0.0, 7.0], vec![5.0, 5.0, 5.0, 7.0])]
    #[case(vec![0.5, 3.0, 1.9], vec![0.5, 3.0, 3.0])]
    #[case(vec![2.0, 2.0], vec![2.0, 2.0])]
    fn dropouts_take_the_previous_value(#[case] mut y: Vec<f64>, #[case] expected: Vec<f64>) {
        repair_dropouts(&mut y);
        assert_eq!(y, expected);
    }

    #[test]
    fn normalize_spans_unit_interval() {
        let mut y = vec![3.0, 5.0, 7.0];
        normalize(&mut y);
        assert_eq!(y, vec![0.0, 0.5, 1.0]);
        let mut flat = vec![4.0; 5];
        normalize(&mut flat);
        assert!(flat.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn cut_time_drops_early_samples_but_keeps_the_time_origin() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![10.0 + i as f64]).collect();
        let refs: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let params = AnalysisParams {
            cut_time_min: 1.0,
            ..AnalysisParams::default()
        };
        let set = filter_curves(&series(&refs, 6), 1, &params).unwrap();
        // 6 s steps: samples at >= 60 s remain
        assert_eq!(set.time_min.len(), 30);
        assert_eq!(set.time_min[0], 1.0);
        assert_eq!(set.curves[0].len(), 30);
    }

    #[test]
    fn unity_filter_factor_clamps_cutoff_below_nyquist() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![10.0 + i as f64]).collect();
        let refs: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let params = AnalysisParams {
            filter_factor: 1.0,
            ..AnalysisParams::default()
        };
        let set = filter_curves(&series(&refs, 6), 1, &params).unwrap();
        assert!((set.design.cutoff / set.design.nyquist - 0.999).abs() < 1e-12);
    }

    #[test]
    fn too_few_samples_after_cut_is_an_error() {
        let params = AnalysisParams {
            cut_time_min: 10.0,
            ..AnalysisParams::default()
        };
        let err = filter_curves(&series(&[&[5.0], &[6.0], &[7.0]], 6), 1, &params).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MagiError>(),
            Some(MagiError::Data(_))
        ));
    }

    #[test]
    fn short_rows_are_rejected() {
        let err = filter_curves(&series(&[&[5.0, 6.0], &[6.0]], 6), 2, &AnalysisParams::default())
            .unwrap_err();
        assert!(err.to_string().contains("layout needs 2"), "{err}");
    }
}
