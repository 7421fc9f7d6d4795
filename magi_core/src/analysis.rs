//! Analysis API: raw file in, normalized curves and TTPs out.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{AnalysisParams, WellLayout};
use crate::curves::{CurvePoint, FilteredSet, filter_curves};
use crate::error::{MagiError, Result};
use crate::store::{RawWellSample, load_raw_samples, write_atomic};
use crate::ttp::time_to_positive;

/// What the client receives for one analyzed assay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Per well, minutes; negative means not detected.
    pub ttp: Vec<f64>,
    #[serde(rename = "y_filt")]
    pub curves: Vec<Vec<CurvePoint>>,
}

/// Filter already-loaded samples and estimate every well's TTP.
pub fn analyze_samples(
    samples: &[RawWellSample],
    params: &AnalysisParams,
    layout: &WellLayout,
) -> Result<(AnalysisReport, FilteredSet)> {
    let set = filter_curves(samples, layout.well_count(), params)?;
    let ttp = set
        .curves
        .iter()
        .map(|y| time_to_positive(&set.time_min, y))
        .collect();
    let curves = (0..set.curves.len()).map(|w| set.points(w)).collect();
    Ok((AnalysisReport { ttp, curves }, set))
}

/// Analyze `raw_path` and persist the filtered curves next to it as
/// `<stem>_filt.csv`.
pub fn analyze(
    raw_path: &Path,
    params: &AnalysisParams,
    layout: &WellLayout,
) -> Result<AnalysisReport> {
    let samples = load_raw_samples(raw_path)?;
    let (report, set) = analyze_samples(&samples, params, layout)?;

    let out = filtered_path_for(raw_path);
    write_atomic(&out, &filtered_csv(&set)?)
        .map_err(|e| MagiError::Io(format!("write {}: {e}", out.display())))?;

    let detected = report.ttp.iter().filter(|t| **t >= 0.0).count();
    tracing::info!(
        wells = report.ttp.len(),
        detected,
        output = %out.display(),
        "analysis complete"
    );
    Ok(report)
}

/// `<dir>/<stem>_filt.csv` for `<dir>/<stem>.<ext>`.
pub fn filtered_path_for(raw_path: &Path) -> PathBuf {
    let stem = raw_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    raw_path.with_file_name(format!("{stem}_filt.csv"))
}

/// CSV with a `time (min),well 0,..` header and one row per sample.
pub fn filtered_csv(set: &FilteredSet) -> Result<Vec<u8>> {
    let mut w = csv::Writer::from_writer(Vec::new());
    let header: Vec<String> = std::iter::once("time (min)".to_string())
        .chain((0..set.curves.len()).map(|i| format!("well {i}")))
        .collect();
    w.write_record(&header)
        .map_err(|e| MagiError::Io(e.to_string()))?;
    for (i, t) in set.time_min.iter().enumerate() {
        let row: Vec<String> = std::iter::once(t.to_string())
            .chain(set.curves.iter().map(|c| c[i].to_string()))
            .collect();
        w.write_record(&row)
            .map_err(|e| MagiError::Io(e.to_string()))?;
    }
    w.into_inner()
        .map_err(|e| MagiError::Io(e.to_string()).into())
}
