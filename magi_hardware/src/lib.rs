//! Thermal hardware for the MAGI chip heater.
//!
//! Without the `hardware` feature only the simulated plant is available: a
//! lumped first-order thermal model shared by `SimulatedSensor` and
//! `SimulatedHeater`, so duty written to the heater shows up in later sensor
//! reads. With `hardware`, the MCP3008 ADC and the rppal PWM heater are
//! compiled in as well.
pub mod error;
#[cfg(feature = "hardware")]
pub mod heater;
#[cfg(feature = "hardware")]
pub mod mcp3008;

use error::HwError;
use magi_traits::{Channel, Heater, HwResult, Sensor};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "hardware")]
pub use heater::PwmHeater;
#[cfg(feature = "hardware")]
pub use mcp3008::Mcp3008Sensor;

/// ADC counts per degree near room temperature (inverse of the fitted slope).
const COUNTS_PER_DEG_C: f64 = 1.0 / 0.103_926_883_391_915;
/// Temperature reported at zero differential.
const ZERO_DIFF_C: f64 = 24.877_218_273_198_4;
/// Baseline channel level, normalized.
const BASELINE_LEVEL: f64 = 0.1;
const ADC_FULL_SCALE: f64 = 1023.0;

/// Physical constants of the simulated chip.
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    pub ambient_c: f64,
    /// Heating rate at 100 % duty, °C/s.
    pub heat_c_per_s: f64,
    /// Newtonian loss coefficient, 1/s.
    pub loss_per_s: f64,
    /// Extra loss while the fan runs, 1/s.
    pub fan_loss_per_s: f64,
    /// Top sensor sits this much cooler than the bottom one.
    pub top_offset_c: f64,
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            ambient_c: 23.0,
            heat_c_per_s: 2.0,
            loss_per_s: 0.02,
            fan_loss_per_s: 0.005,
            top_offset_c: 0.5,
            time_scale: 1.0,
        }
    }
}

#[derive(Debug)]
struct Plant {
    params: SimParams,
    temperature_c: f64,
    duty: f64,
    fan_on: bool,
    last_update: Instant,
    reads: u64,
    fail_every: Option<u64>,
}

impl Plant {
    fn advance(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64() * self.params.time_scale;
        self.last_update = now;
        if dt <= 0.0 {
            return;
        }
        let p = &self.params;
        let loss = p.loss_per_s + if self.fan_on { p.fan_loss_per_s } else { 0.0 };
        // Integrate in small steps so large time scales stay stable.
        let steps = (dt / 0.05).ceil().max(1.0) as usize;
        let h = dt / steps as f64;
        for _ in 0..steps {
            let d_t = p.heat_c_per_s * self.duty / 100.0 - loss * (self.temperature_c - p.ambient_c);
            self.temperature_c += d_t * h;
        }
    }
}

/// Handle to one simulated plant; hand out a sensor and a heater from it.
#[derive(Debug, Clone)]
pub struct ThermalSim {
    plant: Arc<Mutex<Plant>>,
}

impl Default for ThermalSim {
    fn default() -> Self {
        Self::new(SimParams::default())
    }
}

impl ThermalSim {
    pub fn new(params: SimParams) -> Self {
        // Test hook: make every Nth sensor read time out.
        let fail_every = std::env::var("MAGI_TEST_SIM_FAIL_EVERY")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n > 0);
        Self {
            plant: Arc::new(Mutex::new(Plant {
                params,
                temperature_c: params.ambient_c,
                duty: 0.0,
                fan_on: false,
                last_update: Instant::now(),
                reads: 0,
                fail_every,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Plant> {
        self.plant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor { sim: self.clone() }
    }

    pub fn heater(&self) -> SimulatedHeater {
        SimulatedHeater { sim: self.clone() }
    }

    /// True chip temperature of the model, °C.
    pub fn temperature_c(&self) -> f64 {
        let mut plant = self.lock();
        plant.advance(Instant::now());
        plant.temperature_c
    }

    pub fn duty(&self) -> f64 {
        self.lock().duty
    }

    pub fn fan_on(&self) -> bool {
        self.lock().fan_on
    }

    /// Inject a sensor fault every `n` reads (0 disables).
    pub fn set_fail_every(&self, n: u64) {
        self.lock().fail_every = (n > 0).then_some(n);
    }
}

/// Simulated three-channel sensor bridge.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    sim: ThermalSim,
}

impl Sensor for SimulatedSensor {
    fn read_channel(&mut self, channel: Channel, _timeout: Duration) -> HwResult<f64> {
        let mut plant = self.sim.lock();
        plant.advance(Instant::now());
        plant.reads = plant.reads.wrapping_add(1);
        if let Some(n) = plant.fail_every
            && plant.reads % n == 0
        {
            tracing::debug!(reads = plant.reads, "simulated sensor timeout");
            return Err(Box::new(HwError::Timeout));
        }
        let temp = match channel {
            Channel::Baseline => return Ok(BASELINE_LEVEL),
            Channel::Bottom => plant.temperature_c,
            Channel::Top => plant.temperature_c - plant.params.top_offset_c,
        };
        let diff_counts = (temp - ZERO_DIFF_C) * COUNTS_PER_DEG_C;
        Ok((BASELINE_LEVEL + diff_counts / ADC_FULL_SCALE).clamp(0.0, 1.0))
    }
}

/// Simulated PWM heater and fan.
#[derive(Debug, Clone)]
pub struct SimulatedHeater {
    sim: ThermalSim,
}

impl Heater for SimulatedHeater {
    fn set_duty_cycle(&mut self, percent: f64) -> HwResult<()> {
        let mut plant = self.sim.lock();
        plant.advance(Instant::now());
        plant.duty = percent.clamp(0.0, 100.0);
        Ok(())
    }

    fn set_auxiliary(&mut self, on: bool) -> HwResult<()> {
        let mut plant = self.sim.lock();
        plant.advance(Instant::now());
        plant.fan_on = on;
        Ok(())
    }
}
