//! PID feedback on the filtered setpoint.
//!
//! Integral and derivative use the measured time between evaluations. The
//! integral term is kept in output units and clamped to the output limits so
//! a long saturation does not wind it up.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    output_min: f64,
    output_max: f64,
    integral: f64,
    last_error: Option<f64>,
    last_time: Instant,
}

impl Pid {
    pub fn new(gains: PidGains, output_min: f64, output_max: f64, now: Instant) -> Self {
        Self {
            gains,
            output_min,
            output_max,
            integral: 0.0,
            last_error: None,
            last_time: now,
        }
    }

    /// Forget accumulated state; the next derivative term is zero.
    pub fn reset(&mut self, now: Instant) {
        self.integral = 0.0;
        self.last_error = None;
        self.last_time = now;
    }

    /// Integral contribution, in output units.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Compute the clamped output for one evaluation at `now`.
    pub fn update(&mut self, setpoint: f64, measured: f64, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last_time).as_secs_f64();
        let error = setpoint - measured;

        let p = self.gains.kp * error;
        self.integral = (self.integral + self.gains.ki * error * dt)
            .clamp(self.output_min, self.output_max);
        let d = match self.last_error {
            Some(prev) if dt > 0.0 => self.gains.kd * (error - prev) / dt,
            _ => 0.0,
        };

        self.last_error = Some(error);
        self.last_time = now;
        (p + self.integral + d).clamp(self.output_min, self.output_max)
    }
}
