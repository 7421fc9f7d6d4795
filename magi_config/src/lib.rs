#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the MAGI instrument.
//!
//! - `Config` and its sections are deserialized from TOML; every section is
//!   optional and defaults to the values the instrument shipped with.
//! - `CardConfig` is the assay card JSON the web client sends with
//!   `setupAssay`; it describes the well grid and the imaging ROIs.
use serde::Deserialize;
use serde::de::Deserializer;
use std::path::PathBuf;

/// Fitted sensor calibration, ascending powers: a0 + a1·d + … + a5·d⁵.
pub const DEFAULT_CALIBRATION: [f64; 6] = [
    24.877_218_273_198_4,
    0.103_926_883_391_915,
    0.000_050_221_190_887_12,
    -0.000_000_006_116_049_06,
    -0.000_000_000_276_483_57,
    0.000_000_000_002_254_74,
];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Duty-cycle bounds, percent
    pub output_min: f64,
    pub output_max: f64,
    /// Setpoint pre-filter: filtered = a·previous + b·desired
    pub prefilter_a: f64,
    pub prefilter_b: f64,
    /// Pre-filter memory at process start (°C)
    pub prefilter_initial_c: f64,
    /// Desired chip temperature until a client changes it (°C)
    pub setpoint_c: f64,
    /// Weight of the bottom sensor in the blended temperature, [0, 1]
    pub bias: f64,
    pub update_period_ms: u64,
    /// Shared temperature is refreshed at most this often
    pub publish_period_ms: u64,
    pub calibration: [f64; 6],
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            kp: 12.376,
            ki: 0.991,
            kd: 0.0,
            output_min: 0.0,
            output_max: 100.0,
            prefilter_a: 0.999_949_127,
            prefilter_b: 0.000_050_873,
            prefilter_initial_c: 23.0,
            setpoint_c: 60.0,
            bias: 0.82,
            update_period_ms: 50,
            publish_period_ms: 50,
            calibration: DEFAULT_CALIBRATION,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Hardware {
    /// Deadline for a single ADC read before it counts as a transient failure
    pub sensor_read_timeout_ms: u64,
    /// Normalized ADC readings are scaled by this to get counts
    pub adc_full_scale: f64,
    pub pwm_frequency_hz: f64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 100,
            adc_full_scale: 1023.0,
            pwm_frequency_hz: 5.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub heater_pwm: u8,
    pub fan: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            heater_pwm: 19,
            fan: 26,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisCfg {
    /// Low-pass aggressiveness; cutoff = Nyquist / filter_factor
    pub filter_factor: f64,
    /// Warm-up minutes discarded before filtering
    pub cut_time_min: f64,
    /// Wells whose raw maximum stays below this are treated as empty
    pub threshold: f64,
}

impl Default for AnalysisCfg {
    fn default() -> Self {
        Self {
            filter_factor: 10.0,
            cut_time_min: 0.0,
            threshold: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataCfg {
    /// Where raw and filtered CSVs live (a ramdisk on the instrument)
    pub directory: PathBuf,
    /// Append-only file for the assay in progress
    pub temp_file: String,
}

impl Default for DataCfg {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("magi"),
            temp_file: "temp_data.csv".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub control: ControlCfg,
    pub hardware: Hardware,
    pub pins: Pins,
    pub analysis: AnalysisCfg,
    pub data: DataCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        let c = &self.control;
        for (name, v) in [("kp", c.kp), ("ki", c.ki), ("kd", c.kd)] {
            if !v.is_finite() {
                eyre::bail!("control.{name} must be finite");
            }
        }
        if !(c.output_min.is_finite() && c.output_max.is_finite()) || c.output_min >= c.output_max {
            eyre::bail!("control.output_min must be < control.output_max");
        }
        if c.output_min < 0.0 || c.output_max > 100.0 {
            eyre::bail!("control.output_min/output_max must lie within [0, 100]");
        }
        if !(c.prefilter_a > 0.0 && c.prefilter_a < 1.0) {
            eyre::bail!("control.prefilter_a must be in (0.0, 1.0)");
        }
        if !(c.prefilter_b > 0.0 && c.prefilter_b < 1.0) {
            eyre::bail!("control.prefilter_b must be in (0.0, 1.0)");
        }
        if !(0.0..=1.0).contains(&c.bias) {
            eyre::bail!("control.bias must be in [0.0, 1.0]");
        }
        if c.update_period_ms == 0 {
            eyre::bail!("control.update_period_ms must be >= 1");
        }
        if c.publish_period_ms < c.update_period_ms {
            eyre::bail!("control.publish_period_ms must be >= control.update_period_ms");
        }
        if c.calibration.iter().any(|a| !a.is_finite()) {
            eyre::bail!("control.calibration coefficients must be finite");
        }
        if !c.setpoint_c.is_finite() || !c.prefilter_initial_c.is_finite() {
            eyre::bail!("control.setpoint_c and control.prefilter_initial_c must be finite");
        }

        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }
        if self.hardware.adc_full_scale <= 0.0 {
            eyre::bail!("hardware.adc_full_scale must be > 0");
        }
        if self.hardware.pwm_frequency_hz <= 0.0 {
            eyre::bail!("hardware.pwm_frequency_hz must be > 0");
        }

        let a = &self.analysis;
        if a.filter_factor.is_nan() || a.filter_factor < 1.0 {
            eyre::bail!("analysis.filter_factor must be >= 1");
        }
        if a.cut_time_min.is_nan() || a.cut_time_min < 0.0 {
            eyre::bail!("analysis.cut_time_min must be >= 0");
        }
        if a.threshold.is_nan() || a.threshold < 0.0 {
            eyre::bail!("analysis.threshold must be >= 0");
        }

        if self.data.temp_file.trim().is_empty() {
            eyre::bail!("data.temp_file must not be empty");
        }

        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}

/// Assay card as sent by the client.
///
/// Numeric fields arrive either as JSON numbers or as numeric strings
/// (form values), so both are accepted.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CardConfig {
    /// Rows × cols grid of target names, row-major
    #[serde(deserialize_with = "de_targets")]
    pub well_config: Vec<Vec<String>>,
    #[serde(default, deserialize_with = "de_point")]
    pub roi_upper_left: (i64, i64),
    #[serde(default, deserialize_with = "de_flex_i64")]
    pub roi_width: i64,
    #[serde(default, deserialize_with = "de_flex_i64")]
    pub roi_height: i64,
    #[serde(default, deserialize_with = "de_flex_i64")]
    pub roi_spacing_x: i64,
    #[serde(default, deserialize_with = "de_flex_i64")]
    pub roi_spacing_y: i64,
    #[serde(default)]
    pub hit_criteria: Option<serde_json::Value>,
}

pub fn load_card_json(s: &str) -> eyre::Result<CardConfig> {
    let card: CardConfig =
        serde_json::from_str(s).map_err(|e| eyre::eyre!("invalid card JSON: {e}"))?;
    card.validate()?;
    Ok(card)
}

impl CardConfig {
    pub fn validate(&self) -> eyre::Result<()> {
        let Some(first) = self.well_config.first() else {
            eyre::bail!("well_config must have at least one row");
        };
        if first.is_empty() {
            eyre::bail!("well_config rows must have at least one column");
        }
        if let Some(r) = self.well_config.iter().position(|row| row.len() != first.len()) {
            eyre::bail!(
                "well_config row {r} has {} columns, expected {}",
                self.well_config[r].len(),
                first.len()
            );
        }
        if self.roi_width < 0 || self.roi_height < 0 {
            eyre::bail!("roi_width and roi_height must be >= 0");
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.well_config.len()
    }

    pub fn cols(&self) -> usize {
        self.well_config.first().map_or(0, Vec::len)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlexNum {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FlexNum {
    fn to_i64<E: serde::de::Error>(&self) -> Result<i64, E> {
        match self {
            FlexNum::Int(v) => Ok(*v),
            FlexNum::Float(v) if v.is_finite() => Ok(v.trunc() as i64),
            FlexNum::Float(v) => Err(E::custom(format!("non-finite number {v}"))),
            FlexNum::Text(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .or_else(|_| t.parse::<f64>().map(|f| f.trunc() as i64))
                    .map_err(|_| E::custom(format!("expected a number, got {s:?}")))
            }
        }
    }
}

fn de_flex_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    FlexNum::deserialize(deserializer)?.to_i64()
}

fn de_point<'de, D>(deserializer: D) -> Result<(i64, i64), D::Error>
where
    D: Deserializer<'de>,
{
    let v: Vec<FlexNum> = Vec::deserialize(deserializer)?;
    if v.len() != 2 {
        return Err(serde::de::Error::custom(format!(
            "expected [x, y], got {} values",
            v.len()
        )));
    }
    Ok((v[0].to_i64()?, v[1].to_i64()?))
}

fn de_targets<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<serde_json::Value>> = Vec::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_instrument_defaults() {
        let cfg = load_toml("").expect("parse");
        assert_eq!(cfg.control.kp, 12.376);
        assert_eq!(cfg.control.calibration, DEFAULT_CALIBRATION);
        assert_eq!(cfg.pins.heater_pwm, 19);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn card_numbers_may_be_strings() {
        let card = load_card_json(
            r#"{"well_config": [["a", "b"], ["c", 7]],
                "roi_upper_left": ["10", 20],
                "roi_width": "8", "roi_height": 8.0,
                "roi_spacing_x": 30, "roi_spacing_y": "30"}"#,
        )
        .expect("card");
        assert_eq!(card.roi_upper_left, (10, 20));
        assert_eq!(card.roi_width, 8);
        assert_eq!(card.well_config[1][1], "7");
        assert_eq!((card.rows(), card.cols()), (2, 2));
    }
}
