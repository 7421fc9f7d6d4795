//! Type-state builder for `TemperatureController`.
//!
//! `build()` only exists once both a sensor and a heater were supplied;
//! `try_build()` is always available and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;

use magi_traits::{Clock, Heater, MonotonicClock, Sensor};

use crate::config::ControlCfg;
use crate::control::{Hardware, TemperatureController};
use crate::error::{BuildError, Result};

pub struct Missing;
pub struct Set;

pub struct ControllerBuilder<S, H> {
    sensor: Option<Box<dyn Sensor + Send>>,
    heater: Option<Box<dyn Heater + Send>>,
    control: Option<ControlCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _h: PhantomData<H>,
}

impl Default for ControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            heater: None,
            control: None,
            clock: None,
            _s: PhantomData,
            _h: PhantomData,
        }
    }
}

impl TemperatureController {
    pub fn builder() -> ControllerBuilder<Missing, Missing> {
        ControllerBuilder::default()
    }
}

pub(crate) fn validate(c: &ControlCfg) -> Result<()> {
    let invalid =
        |msg: &'static str| -> Result<()> { Err(eyre::Report::new(BuildError::InvalidConfig(msg))) };
    if !(c.output_min.is_finite() && c.output_max.is_finite()) || c.output_min >= c.output_max {
        return invalid("output_min must be < output_max");
    }
    if c.output_min < 0.0 || c.output_max > 100.0 {
        return invalid("output limits must lie within [0, 100] % duty");
    }
    if !(c.gains.kp.is_finite() && c.gains.ki.is_finite() && c.gains.kd.is_finite()) {
        return invalid("PID gains must be finite");
    }
    if !(c.prefilter_a > 0.0 && c.prefilter_a < 1.0 && c.prefilter_b > 0.0 && c.prefilter_b < 1.0)
    {
        return invalid("pre-filter coefficients must be in (0, 1)");
    }
    if !(0.0..=1.0).contains(&c.bias) {
        return invalid("bias must be in [0, 1]");
    }
    if c.update_period.is_zero() {
        return invalid("update_period must be > 0");
    }
    if c.publish_period < c.update_period {
        return invalid("publish_period must be >= update_period");
    }
    if c.sensor_timeout.is_zero() {
        return invalid("sensor_timeout must be > 0");
    }
    if c.adc_full_scale.is_nan() || c.adc_full_scale <= 0.0 {
        return invalid("adc_full_scale must be > 0");
    }
    Ok(())
}

impl<S, H> ControllerBuilder<S, H> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<TemperatureController> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let heater = self
            .heater
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHeater))?;
        let control = self.control.unwrap_or_default();
        validate(&control)?;
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        Ok(TemperatureController::from_parts(
            Hardware { sensor, heater },
            control,
            clock,
        ))
    }

    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.control = Some(control);
        self
    }

    /// Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }
}

impl<H> ControllerBuilder<Missing, H> {
    pub fn with_sensor(self, sensor: impl Sensor + Send + 'static) -> ControllerBuilder<Set, H> {
        ControllerBuilder {
            sensor: Some(Box::new(sensor)),
            heater: self.heater,
            control: self.control,
            clock: self.clock,
            _s: PhantomData,
            _h: PhantomData,
        }
    }
}

impl<S> ControllerBuilder<S, Missing> {
    pub fn with_heater(self, heater: impl Heater + Send + 'static) -> ControllerBuilder<S, Set> {
        ControllerBuilder {
            sensor: self.sensor,
            heater: Some(Box::new(heater)),
            control: self.control,
            clock: self.clock,
            _s: PhantomData,
            _h: PhantomData,
        }
    }
}

impl ControllerBuilder<Set, Set> {
    pub fn build(self) -> Result<TemperatureController> {
        self.try_build()
    }
}
