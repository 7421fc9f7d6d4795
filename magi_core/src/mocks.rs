//! Test and helper mocks for magi_core

use magi_traits::{Channel, Heater, HwResult, Sensor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Sensor returning fixed normalized levels per channel, optionally failing
/// every Nth read with a timeout error.
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    levels: [f64; 3],
    reads: Arc<AtomicU64>,
    fail_every: u64,
}

impl ScriptedSensor {
    pub fn constant(baseline: f64, bottom: f64, top: f64) -> Self {
        Self {
            levels: [baseline, bottom, top],
            reads: Arc::new(AtomicU64::new(0)),
            fail_every: 0,
        }
    }

    /// Make every `n`th read fail (0 disables).
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl Sensor for ScriptedSensor {
    fn read_channel(&mut self, channel: Channel, _timeout: Duration) -> HwResult<f64> {
        let n = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "scripted read timed out",
            )));
        }
        Ok(self.levels[usize::from(channel.index())])
    }
}

#[derive(Debug, Default)]
struct SpyState {
    duties: Vec<f64>,
    fan_on: bool,
    fail_nonzero_writes: bool,
}

/// Heater that records every command; clones share one record.
#[derive(Debug, Clone, Default)]
pub struct SpyHeater {
    state: Arc<Mutex<SpyState>>,
}

impl SpyHeater {
    /// Heater that rejects any nonzero duty but accepts zero.
    pub fn rejecting_nonzero() -> Self {
        let spy = Self::default();
        spy.lock().fail_nonzero_writes = true;
        spy
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn duties(&self) -> Vec<f64> {
        self.lock().duties.clone()
    }

    pub fn last_duty(&self) -> Option<f64> {
        self.lock().duties.last().copied()
    }

    pub fn fan_on(&self) -> bool {
        self.lock().fan_on
    }
}

impl Heater for SpyHeater {
    fn set_duty_cycle(&mut self, percent: f64) -> HwResult<()> {
        let mut st = self.lock();
        if st.fail_nonzero_writes && percent != 0.0 {
            return Err(Box::new(std::io::Error::other("pwm write rejected")));
        }
        st.duties.push(percent);
        Ok(())
    }

    fn set_auxiliary(&mut self, on: bool) -> HwResult<()> {
        self.lock().fan_on = on;
        Ok(())
    }
}
