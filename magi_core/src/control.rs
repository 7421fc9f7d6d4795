//! Closed-loop chip temperature control.
//!
//! `TemperatureController` owns the hardware and spawns one loop thread per
//! `start()`. The thread reads the three sensor channels, blends the two
//! calibrated differentials, runs the pre-filtered setpoint through the PID
//! and drives the heater. It talks to the outside only through
//! `SharedTemperature`, the atomic desired setpoint, the shutdown flag and a
//! small channel of cycle samples.
//!
//! Lifecycle:
//! - `start()` on a running loop is an error (`MagiError::AlreadyRunning`).
//! - `stop()` on a stopped loop is a no-op.
//! - `stop()` returns only after the thread has exited and the heater has
//!   been driven to zero.
//!
//! The pre-filter state moves into the thread on `start()` and comes back
//! through the join handle, so it carries over from one run to the next.
//! PID state is created fresh on every start.

use crossbeam_channel as xch;
use magi_traits::{Channel, Clock, Heater, MonotonicClock, Sensor};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::builder::validate;
use crate::config::ControlCfg;
use crate::error::{MagiError, Result};
use crate::hw_error::map_boxed;
use crate::pid::Pid;
use crate::prefilter::{PreFilterState, prefilter};
use crate::shared::SharedTemperature;
use crate::status::{LoopState, LoopStatus};

/// Sensor and heater behind one lock, shared between the controller and the
/// loop thread.
pub struct Hardware {
    pub sensor: Box<dyn Sensor + Send>,
    pub heater: Box<dyn Heater + Send>,
}

impl core::fmt::Debug for Hardware {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hardware").finish_non_exhaustive()
    }
}

/// What one control cycle saw and did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSample {
    pub measured_c: f64,
    pub setpoint_c: f64,
    pub duty: f64,
}

const SAMPLE_BACKLOG: usize = 16;

pub struct TemperatureController {
    hw: Arc<Mutex<Hardware>>,
    cfg: ControlCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    shared: SharedTemperature,
    desired_bits: Arc<AtomicU64>,
    heater_faults: Arc<AtomicU64>,
    prefilter: PreFilterState,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<PreFilterState>>,
    samples_tx: xch::Sender<CycleSample>,
    samples_rx: xch::Receiver<CycleSample>,
}

impl core::fmt::Debug for TemperatureController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TemperatureController")
            .field("running", &self.is_running())
            .field("desired_c", &self.desired_temperature())
            .field("measured_c", &self.shared.value_c())
            .finish()
    }
}

impl TemperatureController {
    pub(crate) fn from_parts(
        hw: Hardware,
        cfg: ControlCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let (samples_tx, samples_rx) = xch::bounded(SAMPLE_BACKLOG);
        Self {
            hw: Arc::new(Mutex::new(hw)),
            shared: SharedTemperature::new(cfg.prefilter_initial_c),
            desired_bits: Arc::new(AtomicU64::new(cfg.initial_setpoint_c.to_bits())),
            heater_faults: Arc::new(AtomicU64::new(0)),
            prefilter: PreFilterState::new(cfg.prefilter_initial_c),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
            samples_tx,
            samples_rx,
            cfg,
            clock,
        }
    }

    /// Controller on the real monotonic clock. Rejects the same configs as
    /// the builder.
    pub fn new<S, H>(sensor: S, heater: H, cfg: ControlCfg) -> Result<Self>
    where
        S: Sensor + Send + 'static,
        H: Heater + Send + 'static,
    {
        validate(&cfg)?;
        Ok(Self::from_parts(
            Hardware {
                sensor: Box::new(sensor),
                heater: Box::new(heater),
            },
            cfg,
            Arc::new(MonotonicClock::new()),
        ))
    }

    pub fn config(&self) -> &ControlCfg {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn the control loop. Resets the PID, keeps the pre-filter memory,
    /// and switches the cooling fan on.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(MagiError::AlreadyRunning.into());
        }

        lock(&self.hw)
            .heater
            .set_auxiliary(true)
            .map_err(|e| map_boxed(e.as_ref()))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        self.shutdown = shutdown.clone();

        let ctx = LoopCtx {
            hw: self.hw.clone(),
            cfg: self.cfg.clone(),
            clock: self.clock.clone(),
            shared: self.shared.clone(),
            desired_bits: self.desired_bits.clone(),
            heater_faults: self.heater_faults.clone(),
            shutdown,
            samples_tx: self.samples_tx.clone(),
            samples_rx: self.samples_rx.clone(),
        };
        let state = self.prefilter;
        let spawned = std::thread::Builder::new()
            .name("magi-control".into())
            .spawn(move || ctx.run(state));
        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                if let Err(fan) = lock(&self.hw).heater.set_auxiliary(false) {
                    tracing::error!(error = %fan, "failed to switch fan off after spawn error");
                }
                return Err(MagiError::Io(e.to_string()).into());
            }
        };
        self.worker = Some(handle);

        tracing::info!(
            desired_c = self.desired_temperature(),
            prefilter_c = state.previous,
            period_ms = self.cfg.update_period.as_millis() as u64,
            "temperature control started"
        );
        Ok(())
    }

    /// Stop the loop, then drive the heater to zero and the fan off.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            tracing::debug!("stop requested while already stopped");
            return Ok(());
        };

        self.shutdown.store(true, Ordering::Release);
        match handle.join() {
            Ok(state) => {
                tracing::trace!("control thread joined successfully");
                self.prefilter = state;
            }
            Err(e) => {
                tracing::warn!(?e, "control thread panicked; re-seeding pre-filter");
                self.prefilter = PreFilterState::new(self.cfg.prefilter_initial_c);
            }
        }

        let mut hw = lock(&self.hw);
        let duty = hw.heater.set_duty_cycle(0.0);
        let fan = hw.heater.set_auxiliary(false);
        drop(hw);

        if let Err(e) = duty.and(fan) {
            tracing::error!(error = %e, "failed to zero heater on stop");
            return Err(MagiError::HardwareFault(e.to_string()).into());
        }
        tracing::info!(
            heater_faults = self.heater_faults(),
            "temperature control stopped"
        );
        Ok(())
    }

    /// New desired temperature; picked up on the next cycle. Non-finite
    /// values are rejected and the previous setpoint stays in effect.
    pub fn set_desired_temperature(&self, celsius: f64) -> Result<()> {
        if !celsius.is_finite() {
            return Err(
                MagiError::Config(format!("desired temperature must be finite, got {celsius}"))
                    .into(),
            );
        }
        self.desired_bits.store(celsius.to_bits(), Ordering::Relaxed);
        tracing::debug!(desired_c = celsius, "desired temperature set");
        Ok(())
    }

    pub fn desired_temperature(&self) -> f64 {
        f64::from_bits(self.desired_bits.load(Ordering::Relaxed))
    }

    /// Most recently published measured temperature, °C.
    pub fn get_current_temperature(&self) -> f64 {
        self.shared.value_c()
    }

    /// Handle readers can keep without borrowing the controller.
    pub fn shared_temperature(&self) -> SharedTemperature {
        self.shared.clone()
    }

    /// Mean of `n` reads of the shared temperature spaced `interval` apart.
    pub fn average_temperature(&self, n: usize, interval: Duration) -> f64 {
        if n == 0 {
            return self.get_current_temperature();
        }
        let mut sum = 0.0;
        for _ in 0..n {
            sum += self.get_current_temperature();
            self.clock.sleep(interval);
        }
        sum / n as f64
    }

    /// Heater writes that failed while running, since construction.
    pub fn heater_faults(&self) -> u64 {
        self.heater_faults.load(Ordering::Relaxed)
    }

    /// Newest cycle sample not yet consumed, if any.
    pub fn latest_sample(&self) -> Option<CycleSample> {
        self.samples_rx.try_iter().last()
    }

    /// Pre-filter memory; only observable while stopped.
    pub fn prefilter_state(&self) -> Option<PreFilterState> {
        (!self.is_running()).then_some(self.prefilter)
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            state: if self.is_running() {
                LoopState::Running
            } else {
                LoopState::Stopped
            },
            desired_c: self.desired_temperature(),
            measured_c: self.get_current_temperature(),
            heater_faults: self.heater_faults(),
        }
    }
}

impl Drop for TemperatureController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "failed to stop temperature control on drop");
        }
    }
}

fn lock(hw: &Mutex<Hardware>) -> MutexGuard<'_, Hardware> {
    hw.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LoopCtx {
    hw: Arc<Mutex<Hardware>>,
    cfg: ControlCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    shared: SharedTemperature,
    desired_bits: Arc<AtomicU64>,
    heater_faults: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    samples_tx: xch::Sender<CycleSample>,
    samples_rx: xch::Receiver<CycleSample>,
}

impl LoopCtx {
    fn run(self, mut state: PreFilterState) -> PreFilterState {
        let cfg = &self.cfg;
        let mut pid = Pid::new(cfg.gains, cfg.output_min, cfg.output_max, self.clock.now());
        let mut last_publish: Option<Instant> = None;

        while !self.shutdown.load(Ordering::Acquire) {
            let cycle_start = self.clock.now();
            {
                let mut hw = lock(&self.hw);
                match measure(hw.sensor.as_mut(), cfg) {
                    Ok(measured_c) => {
                        let desired = f64::from_bits(self.desired_bits.load(Ordering::Relaxed));
                        let setpoint_c =
                            prefilter(desired, &mut state, cfg.prefilter_a, cfg.prefilter_b);
                        let now = self.clock.now();
                        let duty = pid.update(setpoint_c, measured_c, now);
                        if !(setpoint_c.is_finite() && duty.is_finite()) {
                            self.drive(&mut hw, 0.0);
                            drop(hw);
                            tracing::error!(setpoint_c, duty, "non-finite control output; heater off");
                            state = PreFilterState::new(cfg.prefilter_initial_c);
                            pid.reset(now);
                        } else {
                            self.drive(&mut hw, duty);
                            drop(hw);

                            let due = last_publish.is_none_or(|t| {
                                now.saturating_duration_since(t) >= cfg.publish_period
                            });
                            if due {
                                self.shared.publish(measured_c, now);
                                last_publish = Some(now);
                            }
                            self.offer(CycleSample {
                                measured_c,
                                setpoint_c,
                                duty,
                            });
                            tracing::trace!(measured_c, setpoint_c, duty, "control cycle");
                        }
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!(error = %e, "sensor read failed; skipping control cycle");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "bad temperature reading; skipping control cycle");
                    }
                }
            }

            // Check shutdown before sleep to avoid unnecessary delay
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let spent = self.clock.now().saturating_duration_since(cycle_start);
            self.clock.sleep(cfg.update_period.saturating_sub(spent));
        }
        tracing::trace!("control thread exiting cleanly");
        state
    }

    fn drive(&self, hw: &mut Hardware, duty: f64) {
        if let Err(e) = hw.heater.set_duty_cycle(duty) {
            self.heater_faults.fetch_add(1, Ordering::Relaxed);
            let zeroed = hw.heater.set_duty_cycle(0.0).is_ok();
            tracing::error!(error = %e, duty, zeroed, "heater write failed");
        }
    }

    /// Keep the newest samples; drop the oldest when the backlog is full.
    fn offer(&self, sample: CycleSample) {
        if let Err(xch::TrySendError::Full(sample)) = self.samples_tx.try_send(sample) {
            let _ = self.samples_rx.try_recv();
            let _ = self.samples_tx.try_send(sample);
        }
    }
}

/// One blended reading outside the control loop, e.g. for a health check.
pub fn read_temperature(sensor: &mut dyn Sensor, cfg: &ControlCfg) -> Result<f64> {
    Ok(measure(sensor, cfg)?)
}

/// Blended chip temperature from one read of all three channels.
fn measure(sensor: &mut dyn Sensor, cfg: &ControlCfg) -> std::result::Result<f64, MagiError> {
    let mut counts = [0.0; 3];
    for ch in Channel::ALL {
        let v = sensor
            .read_channel(ch, cfg.sensor_timeout)
            .map_err(|e| map_boxed(e.as_ref()))?;
        counts[usize::from(ch.index())] = v * cfg.adc_full_scale;
    }
    let [baseline, bottom, top] = counts;
    let t_bottom = cfg.calibration.to_celsius(bottom - baseline);
    let t_top = cfg.calibration.to_celsius(top - baseline);
    let measured = cfg.bias * t_bottom + (1.0 - cfg.bias) * t_top;
    if !measured.is_finite() {
        return Err(MagiError::Data(format!("non-finite temperature {measured}")));
    }
    Ok(measured)
}
