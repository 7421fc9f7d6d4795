//! Client actions against one instrument.
//!
//! The web client posts `[action, data]` JSON pairs. `Action::parse` turns
//! one into a typed action and `Instrument::execute` runs it against the
//! temperature controller, the raw sample store and the loaded assay card.
//! Every action runs inside an `action` tracing span.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::analysis::analyze;
use crate::config::{AnalysisParams, WellLayout};
use crate::control::TemperatureController;
use crate::error::{MagiError, Result};
use crate::store::RawSampleStore;

/// Reads averaged for `getTemperature`.
const TEMPERATURE_READS: usize = 3;
const TEMPERATURE_READ_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Ping,
    OnLoad,
    SetupAssay {
        card_filename: String,
        card: magi_config::CardConfig,
    },
    Start,
    SetTemperature(f64),
    GetTemperature,
    RecordWellData(Vec<f64>),
    EndAssay,
    Analyze {
        filename: String,
        params: AnalysisParams,
    },
    GetLog,
    ClearLog,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Ping => "ping",
            Action::OnLoad => "onLoad",
            Action::SetupAssay { .. } => "setupAssay",
            Action::Start => "start",
            Action::SetTemperature(_) => "setTemperature",
            Action::GetTemperature => "getTemperature",
            Action::RecordWellData(_) => "recordWellData",
            Action::EndAssay => "endAssay",
            Action::Analyze { .. } => "analyze",
            Action::GetLog => "getLog",
            Action::ClearLog => "clearLog",
        }
    }

    /// Parse a `[action, data]` pair.
    pub fn parse(json: &str) -> Result<Self> {
        let v: Value = serde_json::from_str(json)
            .map_err(|e| MagiError::Config(format!("invalid action JSON: {e}")))?;
        let (name, data) = match v.as_array().map(Vec::as_slice) {
            Some([Value::String(name), data]) => (name.as_str(), data),
            Some([Value::String(name)]) => (name.as_str(), &Value::Null),
            _ => {
                return Err(
                    MagiError::Config("action must be a [name, data] array".into()).into(),
                );
            }
        };

        let action = match name {
            "ping" => Action::Ping,
            "onLoad" => Action::OnLoad,
            "setupAssay" => {
                let card_filename = data
                    .get("card_filename")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let card_dict = data
                    .get("card_dict")
                    .ok_or_else(|| MagiError::Config("setupAssay needs card_dict".into()))?;
                let card = magi_config::load_card_json(&card_dict.to_string())
                    .map_err(|e| MagiError::Config(e.to_string()))?;
                Action::SetupAssay {
                    card_filename,
                    card,
                }
            }
            "start" => Action::Start,
            "setTemperature" => Action::SetTemperature(flex_f64(data, "temperature")?),
            "getTemperature" => Action::GetTemperature,
            "recordWellData" => {
                let values = data
                    .as_array()
                    .ok_or_else(|| MagiError::Config("recordWellData needs an array".into()))?
                    .iter()
                    .map(|v| flex_f64(v, "well value"))
                    .collect::<Result<Vec<_>>>()?;
                Action::RecordWellData(values)
            }
            "endAssay" => Action::EndAssay,
            "analyze" => {
                let filename = data
                    .get("filename")
                    .and_then(Value::as_str)
                    .ok_or_else(|| MagiError::Config("analyze needs a filename".into()))?
                    .to_string();
                if filename.is_empty()
                    || filename.contains(['/', '\\'])
                    || filename.contains("..")
                {
                    return Err(MagiError::Config(format!(
                        "analyze filename {filename:?} must be a plain file name in the data directory"
                    ))
                    .into());
                }
                let defaults = AnalysisParams::default();
                let field = |key: &str, default: f64| match data.get(key) {
                    Some(v) => flex_f64(v, key),
                    None => Ok(default),
                };
                let params = AnalysisParams {
                    filter_factor: field("filter_factor", defaults.filter_factor)?,
                    cut_time_min: field("cut_time", defaults.cut_time_min)?,
                    threshold: field("threshold", defaults.threshold)?,
                };
                Action::Analyze { filename, params }
            }
            "getLog" => Action::GetLog,
            "clearLog" => Action::ClearLog,
            other => {
                return Err(MagiError::Config(format!("unknown action {other:?}")).into());
            }
        };
        Ok(action)
    }
}

/// Numbers arrive as JSON numbers or as numeric strings.
fn flex_f64(v: &Value, what: &str) -> Result<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(MagiError::Config(format!("{what}: expected a number, got {v}")).into()),
    }
}

/// Response body: plain text for most actions, JSON for analysis and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Text(String),
    Json(Value),
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

pub struct Instrument {
    controller: TemperatureController,
    store: RawSampleStore,
    log_file: Option<PathBuf>,
    layout: Option<WellLayout>,
    card_filename: Option<String>,
}

impl Instrument {
    pub fn new(
        controller: TemperatureController,
        store: RawSampleStore,
        log_file: Option<PathBuf>,
    ) -> Self {
        Self {
            controller,
            store,
            log_file,
            layout: None,
            card_filename: None,
        }
    }

    pub fn controller(&self) -> &TemperatureController {
        &self.controller
    }

    pub fn layout(&self) -> Option<&WellLayout> {
        self.layout.as_ref()
    }

    pub fn card_filename(&self) -> Option<&str> {
        self.card_filename.as_deref()
    }

    /// Parse and execute one `[action, data]` line.
    pub fn handle_json(&mut self, line: &str) -> Result<Reply> {
        let action = Action::parse(line)?;
        self.execute(action)
    }

    pub fn execute(&mut self, action: Action) -> Result<Reply> {
        let span = tracing::info_span!("action", name = action.name());
        let _enter = span.enter();
        let started = Instant::now();
        tracing::info!("action received");

        let result = self.dispatch(action);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(elapsed_ms, "action complete"),
            Err(e) => tracing::warn!(elapsed_ms, error = %e, "action failed"),
        }
        result
    }

    fn dispatch(&mut self, action: Action) -> Result<Reply> {
        match action {
            Action::Ping => Ok(Reply::text("server is ready")),
            Action::OnLoad => {
                self.layout = None;
                self.card_filename = None;
                Ok(Reply::text("globals cleared"))
            }
            Action::SetupAssay {
                card_filename,
                card,
            } => {
                let layout = WellLayout::from_card(&card)?;
                tracing::info!(
                    card = %card_filename,
                    rows = layout.rows,
                    cols = layout.cols,
                    "assay card loaded"
                );
                self.layout = Some(layout);
                self.card_filename = Some(card_filename);
                Ok(Reply::text("card configuration updated"))
            }
            Action::Start => {
                if self.controller.is_running() {
                    return Err(MagiError::AlreadyRunning.into());
                }
                self.store.clear()?;
                self.controller.start()?;
                Ok(Reply::text("PID thread started"))
            }
            Action::SetTemperature(c) => {
                self.controller.set_desired_temperature(c)?;
                Ok(Reply::Text(c.to_string()))
            }
            Action::GetTemperature => {
                let t = self
                    .controller
                    .average_temperature(TEMPERATURE_READS, TEMPERATURE_READ_INTERVAL);
                Ok(Reply::Text(t.to_string()))
            }
            Action::RecordWellData(values) => {
                self.record_well_data(chrono::Utc::now().timestamp(), &values)
            }
            Action::EndAssay => {
                let finalized = self.store.finalize(chrono::Local::now());
                // The heater goes off even when there was no data to finalize.
                self.controller.stop()?;
                Ok(Reply::Text(finalized?))
            }
            Action::Analyze { filename, params } => {
                let layout = self.require_layout()?;
                let report = analyze(&self.store.raw_path(&filename), &params, layout)?;
                let v = serde_json::to_value(&report)
                    .map_err(|e| MagiError::Data(e.to_string()))?;
                Ok(Reply::Json(v))
            }
            Action::GetLog => self.read_log(),
            Action::ClearLog => {
                let path = self.require_log_file()?;
                fs::File::create(&path).map_err(MagiError::from)?;
                Ok(Reply::Json(Value::String(format!(
                    "{} cleared",
                    path.display()
                ))))
            }
        }
    }

    /// Append one acquisition stamped with `timestamp` (Unix seconds).
    pub fn record_well_data(&mut self, timestamp: i64, values: &[f64]) -> Result<Reply> {
        let wells = self.require_layout()?.well_count();
        if values.len() != wells {
            return Err(MagiError::Config(format!(
                "expected {wells} well values, got {}",
                values.len()
            ))
            .into());
        }
        self.store.append(timestamp, values)?;
        let echo: Vec<String> = values.iter().map(f64::to_string).collect();
        Ok(Reply::Text(echo.join(",")))
    }

    fn require_layout(&self) -> Result<&WellLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| MagiError::Config("no assay card loaded".into()).into())
    }

    fn require_log_file(&self) -> Result<PathBuf> {
        self.log_file
            .clone()
            .ok_or_else(|| MagiError::Config("no log file configured".into()).into())
    }

    fn read_log(&self) -> Result<Reply> {
        let path = self.require_log_file()?;
        if !path.exists() {
            fs::File::create(&path).map_err(MagiError::from)?;
        }
        let mut text = fs::read_to_string(&path).map_err(MagiError::from)?;
        let size = fs::metadata(&path).map_err(MagiError::from)?.len();
        text.push_str(&format!("\n\nLog file size: {:.2} MB", size as f64 / 1e6));
        Ok(Reply::Json(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"["ping", null]"#, "ping")]
    #[case(r#"["onLoad"]"#, "onLoad")]
    #[case(r#"["setTemperature", "63.5"]"#, "setTemperature")]
    #[case(r#"["recordWellData", [1, "2.5", 3]]"#, "recordWellData")]
    #[case(r#"["analyze", {"filename": "x", "filter_factor": "12", "cut_time": 0, "threshold": "5"}]"#, "analyze")]
    fn parses_client_actions(#[case] json: &str, #[case] name: &str) {
        assert_eq!(Action::parse(json).unwrap().name(), name);
    }

    #[test]
    fn analyze_numbers_may_be_strings() {
        let a = Action::parse(
            r#"["analyze", {"filename": "run1", "filter_factor": "12.5", "cut_time": "2", "threshold": 7}]"#,
        )
        .unwrap();
        assert_eq!(
            a,
            Action::Analyze {
                filename: "run1".into(),
                params: AnalysisParams {
                    filter_factor: 12.5,
                    cut_time_min: 2.0,
                    threshold: 7.0
                }
            }
        );
    }

    #[rstest]
    #[case(r#"["shutdown", null]"#, "unknown action")]
    #[case(r#"{"ping": 1}"#, "[name, data]")]
    #[case(r#"["setTemperature", "hot"]"#, "expected a number")]
    #[case(r#"["analyze", {}]"#, "needs a filename")]
    #[case(r#"["analyze", {"filename": "../../etc/x"}]"#, "plain file name")]
    #[case(r#"["analyze", {"filename": "sub/run1"}]"#, "plain file name")]
    #[case(r#"["analyze", {"filename": "..\\run1"}]"#, "plain file name")]
    #[case(r#"["analyze", {"filename": ""}]"#, "plain file name")]
    #[case("not json", "invalid action JSON")]
    fn rejects_malformed_actions(#[case] json: &str, #[case] needle: &str) {
        let err = Action::parse(json).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MagiError>(),
            Some(MagiError::Config(_))
        ));
        assert!(err.to_string().contains(needle), "{err}");
    }

    #[test]
    fn replies_serialize_untagged() {
        assert_eq!(
            serde_json::to_string(&Reply::text("server is ready")).unwrap(),
            r#""server is ready""#
        );
    }
}
