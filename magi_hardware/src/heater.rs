use crate::error::{HwError, Result};
use magi_traits::{Heater, HwResult};
use rppal::gpio::{Gpio, OutputPin};

/// Software-PWM heater on one GPIO plus a fan on another.
pub struct PwmHeater {
    pwm: OutputPin,
    fan: OutputPin,
    frequency_hz: f64,
}

impl PwmHeater {
    pub fn new(pwm_pin: u8, fan_pin: u8, frequency_hz: f64) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pwm = gpio
            .get(pwm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output_low();
        let fan = gpio
            .get(fan_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output_low();
        pwm.set_pwm_frequency(frequency_hz, 0.0)
            .map_err(|e| HwError::Gpio(e.to_string()))?;
        Ok(Self {
            pwm,
            fan,
            frequency_hz,
        })
    }
}

impl Heater for PwmHeater {
    fn set_duty_cycle(&mut self, percent: f64) -> HwResult<()> {
        let duty = (percent / 100.0).clamp(0.0, 1.0);
        self.pwm
            .set_pwm_frequency(self.frequency_hz, duty)
            .map_err(|e| HwError::Gpio(e.to_string()).into())
    }

    fn set_auxiliary(&mut self, on: bool) -> HwResult<()> {
        if on {
            self.fan.set_high();
        } else {
            self.fan.set_low();
        }
        Ok(())
    }
}

impl Drop for PwmHeater {
    fn drop(&mut self) {
        // Leave the heater off when the process exits.
        let _ = self.pwm.clear_pwm();
        self.pwm.set_low();
        self.fan.set_low();
    }
}
