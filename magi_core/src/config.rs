//! Runtime configuration for the controller and the analysis pipeline.
//!
//! These are separate from the TOML-deserialized config in `magi_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

use crate::calibration::Calibration;
use crate::error::{MagiError, Result};
use crate::pid::PidGains;

/// Control loop parameters. Fixed for the lifetime of one running loop.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    pub gains: PidGains,
    /// Duty-cycle bounds, percent.
    pub output_min: f64,
    pub output_max: f64,
    pub prefilter_a: f64,
    pub prefilter_b: f64,
    /// Pre-filter memory at process start, °C.
    pub prefilter_initial_c: f64,
    /// Desired temperature before any client sets one, °C.
    pub initial_setpoint_c: f64,
    /// Weight of the bottom sensor in the blended temperature.
    pub bias: f64,
    pub update_period: Duration,
    pub publish_period: Duration,
    /// Per-read deadline handed to the sensor.
    pub sensor_timeout: Duration,
    /// Normalized ADC readings are multiplied by this before differencing.
    pub adc_full_scale: f64,
    pub calibration: Calibration,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            gains: PidGains {
                kp: 12.376,
                ki: 0.991,
                kd: 0.0,
            },
            output_min: 0.0,
            output_max: 100.0,
            prefilter_a: 0.999_949_127,
            prefilter_b: 0.000_050_873,
            prefilter_initial_c: 23.0,
            initial_setpoint_c: 60.0,
            bias: 0.82,
            update_period: Duration::from_millis(50),
            publish_period: Duration::from_millis(50),
            sensor_timeout: Duration::from_millis(100),
            adc_full_scale: 1023.0,
            calibration: Calibration::default(),
        }
    }
}

/// Curve pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisParams {
    pub filter_factor: f64,
    pub cut_time_min: f64,
    pub threshold: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            filter_factor: 10.0,
            cut_time_min: 0.0,
            threshold: 0.0,
        }
    }
}

impl AnalysisParams {
    pub fn validate(&self) -> Result<()> {
        if self.filter_factor.is_nan() || self.filter_factor < 1.0 {
            return Err(MagiError::Config("filter_factor must be >= 1".into()).into());
        }
        if self.cut_time_min.is_nan() || self.cut_time_min < 0.0 {
            return Err(MagiError::Config("cut_time must be >= 0".into()).into());
        }
        if self.threshold.is_nan() || self.threshold < 0.0 {
            return Err(MagiError::Config("threshold must be >= 0".into()).into());
        }
        Ok(())
    }
}

/// Pixel rectangle imaged for one well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Well grid of the loaded assay card. Wells are numbered row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct WellLayout {
    pub rows: usize,
    pub cols: usize,
    pub targets: Vec<String>,
    pub rois: Vec<Roi>,
}

impl WellLayout {
    /// Layout with placeholder targets and no imaging geometry.
    pub fn grid(rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(MagiError::Config("well layout has zero wells".into()).into());
        }
        let n = rows * cols;
        Ok(Self {
            rows,
            cols,
            targets: (0..n).map(|i| format!("well {i}")).collect(),
            rois: vec![
                Roi {
                    x: 0,
                    y: 0,
                    width: 0,
                    height: 0,
                };
                n
            ],
        })
    }

    pub fn from_card(card: &magi_config::CardConfig) -> Result<Self> {
        card.validate()
            .map_err(|e| MagiError::Config(e.to_string()))?;
        let (rows, cols) = (card.rows(), card.cols());
        let (x0, y0) = card.roi_upper_left;
        let mut targets = Vec::with_capacity(rows * cols);
        let mut rois = Vec::with_capacity(rows * cols);
        for (r, row) in card.well_config.iter().enumerate() {
            for (c, target) in row.iter().enumerate() {
                targets.push(target.clone());
                rois.push(Roi {
                    x: x0 + card.roi_spacing_x * c as i64,
                    y: y0 + card.roi_spacing_y * r as i64,
                    width: card.roi_width,
                    height: card.roi_height,
                });
            }
        }
        Ok(Self {
            rows,
            cols,
            targets,
            rois,
        })
    }

    pub fn well_count(&self) -> usize {
        self.rows * self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rois_follow_spacing_row_major() {
        let card = magi_config::load_card_json(
            r#"{"well_config": [["a", "b", "c"], ["d", "e", "f"]],
                "roi_upper_left": [100, 50], "roi_width": 10, "roi_height": 12,
                "roi_spacing_x": 30, "roi_spacing_y": 40}"#,
        )
        .unwrap();
        let layout = WellLayout::from_card(&card).unwrap();
        assert_eq!(layout.well_count(), 6);
        assert_eq!(layout.targets[4], "e");
        assert_eq!(
            layout.rois[5],
            Roi {
                x: 160,
                y: 90,
                width: 10,
                height: 12
            }
        );
    }

    #[test]
    fn empty_grid_is_rejected() {
        let err = WellLayout::grid(0, 12).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MagiError>(),
            Some(MagiError::Config(_))
        ));
    }

    #[test]
    fn analysis_params_reject_small_filter_factor() {
        let p = AnalysisParams {
            filter_factor: 0.5,
            ..AnalysisParams::default()
        };
        assert!(p.validate().is_err());
    }
}
