//! `From` implementations bridging `magi_config` types to `magi_core` types.

use std::time::Duration;

use crate::calibration::Calibration;
use crate::config::{AnalysisParams, ControlCfg};
use crate::pid::PidGains;

impl From<&magi_config::Config> for ControlCfg {
    fn from(c: &magi_config::Config) -> Self {
        let ctl = &c.control;
        Self {
            gains: PidGains {
                kp: ctl.kp,
                ki: ctl.ki,
                kd: ctl.kd,
            },
            output_min: ctl.output_min,
            output_max: ctl.output_max,
            prefilter_a: ctl.prefilter_a,
            prefilter_b: ctl.prefilter_b,
            prefilter_initial_c: ctl.prefilter_initial_c,
            initial_setpoint_c: ctl.setpoint_c,
            bias: ctl.bias,
            update_period: Duration::from_millis(ctl.update_period_ms),
            publish_period: Duration::from_millis(ctl.publish_period_ms),
            sensor_timeout: Duration::from_millis(c.hardware.sensor_read_timeout_ms),
            adc_full_scale: c.hardware.adc_full_scale,
            calibration: Calibration::new(ctl.calibration),
        }
    }
}

impl From<&magi_config::AnalysisCfg> for AnalysisParams {
    fn from(a: &magi_config::AnalysisCfg) -> Self {
        Self {
            filter_factor: a.filter_factor,
            cut_time_min: a.cut_time_min,
            threshold: a.threshold,
        }
    }
}
