//! Latest measured chip temperature, published by the control loop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub value_c: f64,
    /// `None` until the loop has published once.
    pub updated_at: Option<Instant>,
}

/// Single-writer, many-reader temperature cell.
///
/// Value and timestamp are published together under one lock, so readers
/// never see one without the other.
#[derive(Debug, Clone)]
pub struct SharedTemperature {
    inner: Arc<Mutex<TemperatureReading>>,
}

impl SharedTemperature {
    pub fn new(initial_c: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TemperatureReading {
                value_c: initial_c,
                updated_at: None,
            })),
        }
    }

    pub fn publish(&self, value_c: f64, at: Instant) {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *g = TemperatureReading {
            value_c,
            updated_at: Some(at),
        };
    }

    pub fn read(&self) -> TemperatureReading {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn value_c(&self) -> f64 {
        self.read().value_c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_the_latest_publish() {
        let shared = SharedTemperature::new(23.0);
        assert_eq!(shared.read().updated_at, None);
        let reader = shared.clone();
        let t = Instant::now();
        shared.publish(41.5, t);
        assert_eq!(
            reader.read(),
            TemperatureReading {
                value_c: 41.5,
                updated_at: Some(t)
            }
        );
    }

    #[test]
    fn concurrent_readers_never_see_torn_values() {
        let shared = SharedTemperature::new(0.0);
        let writer = shared.clone();
        let w = std::thread::spawn(move || {
            for i in 0..2000 {
                writer.publish(f64::from(i), Instant::now());
            }
        });
        for _ in 0..2000 {
            let r = shared.read();
            assert!(r.value_c == 0.0 || r.updated_at.is_some());
        }
        w.join().unwrap();
        assert_eq!(shared.value_c(), 1999.0);
    }
}
