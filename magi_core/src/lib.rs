#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core instrument logic (hardware-agnostic).
//!
//! All hardware interactions go through `magi_traits::Sensor` and
//! `magi_traits::Heater`.
//!
//! ## Architecture
//!
//! - **Temperature control**: polynomial calibration (`calibration`), setpoint
//!   pre-filter (`prefilter`), PID (`pid`) and the loop thread with its shared
//!   temperature (`control`, `shared`, `builder`)
//! - **Curve analysis**: Butterworth second-order sections (`dsp`), per-well
//!   conditioning (`curves`), time-to-positive (`ttp`) and the file-level
//!   analysis API (`analysis`)
//! - **Data**: raw per-well sample files (`store`)
//! - **Actions**: client action parsing and dispatch (`api`)

pub mod analysis;
pub mod api;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod control;
pub mod conversions;
pub mod curves;
pub mod dsp;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod pid;
pub mod prefilter;
pub mod shared;
pub mod status;
pub mod store;
pub mod ttp;

pub use analysis::{AnalysisReport, analyze, analyze_samples};
pub use api::{Action, Instrument, Reply};
pub use calibration::{Calibration, calibrate};
pub use config::{AnalysisParams, ControlCfg, Roi, WellLayout};
pub use control::{CycleSample, TemperatureController};
pub use curves::{CurvePoint, FilteredSet, filter_curves};
pub use error::{BuildError, MagiError, Report, Result};
pub use prefilter::{PreFilterState, prefilter};
pub use shared::SharedTemperature;
pub use status::{LoopState, LoopStatus};
pub use store::{RawSampleStore, RawWellSample, load_raw_samples};
pub use ttp::{TTP_NOT_DETECTED, time_to_positive};
