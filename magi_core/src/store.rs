//! Raw per-well sample files.
//!
//! During an assay each acquisition appends one headerless CSV row
//! `timestamp,v1,..,vN` to the temp file. Ending the assay renames the temp
//! file to a time-stamped name, which is what analysis later reads back.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{MagiError, Result};

/// One acquisition: Unix seconds plus one value per well, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWellSample {
    pub timestamp: i64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RawSampleStore {
    dir: PathBuf,
    temp_file: String,
}

impl RawSampleStore {
    pub fn new(dir: impl Into<PathBuf>, temp_file: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            temp_file: temp_file.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn temp_path(&self) -> PathBuf {
        self.dir.join(&self.temp_file)
    }

    /// Path of a finalized raw file by stem.
    pub fn raw_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.csv"))
    }

    /// Path of the filtered companion of a finalized raw file.
    pub fn filtered_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}_filt.csv"))
    }

    /// Truncate the temp file, creating the data directory if needed.
    pub fn clear(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(MagiError::from)?;
        fs::File::create(self.temp_path()).map_err(MagiError::from)?;
        tracing::debug!(path = %self.temp_path().display(), "temp data cleared");
        Ok(())
    }

    /// Append one acquisition row.
    pub fn append(&self, timestamp: i64, values: &[f64]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(MagiError::from)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.temp_path())
            .map_err(MagiError::from)?;
        let mut w = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let mut record = Vec::with_capacity(values.len() + 1);
        record.push(timestamp.to_string());
        record.extend(values.iter().map(f64::to_string));
        w.write_record(&record)
            .map_err(|e| MagiError::Io(e.to_string()))?;
        w.flush().map_err(MagiError::from)?;
        Ok(())
    }

    /// Move the temp file to `<%Y%m%d_%Hh%Mm%Ss>.csv` and return the stem.
    pub fn finalize<Tz>(&self, now: chrono::DateTime<Tz>) -> Result<String>
    where
        Tz: chrono::TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let stem = now.format("%Y%m%d_%Hh%Mm%Ss").to_string();
        let from = self.temp_path();
        let to = self.raw_path(&stem);
        fs::rename(&from, &to).map_err(|e| {
            MagiError::Io(format!("finalize {} -> {}: {e}", from.display(), to.display()))
        })?;
        tracing::info!(file = %to.display(), "assay data finalized");
        Ok(stem)
    }
}

/// Parse a headerless raw CSV. Every row must have the same number of fields.
pub fn load_raw_samples(path: &Path) -> Result<Vec<RawWellSample>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| MagiError::Io(format!("open raw data {}: {e}", path.display())))?;

    let mut samples = Vec::new();
    for (idx, rec) in rdr.records().enumerate() {
        let line = idx + 1;
        let rec = rec.map_err(|e| MagiError::Data(format!("raw data line {line}: {e}")))?;
        let mut fields = rec.iter();
        let ts = fields.next().unwrap_or_default();
        let timestamp = parse_timestamp(ts).ok_or_else(|| {
            MagiError::Data(format!("raw data line {line}: bad timestamp {ts:?}"))
        })?;
        let values = fields
            .map(|f| match f.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(MagiError::Data(format!(
                    "raw data line {line}: bad value {f:?}"
                ))),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        samples.push(RawWellSample { timestamp, values });
    }

    if samples.is_empty() {
        return Err(MagiError::Data(format!("raw data {} is empty", path.display())).into());
    }
    Ok(samples)
}

fn parse_timestamp(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

/// Write `bytes` to `path` through a synced sibling temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".partial");
    let tmp = path.with_file_name(tmp_name);
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);
    fs::rename(&tmp, path)
}
