//! Hardware assembly, the `run` hold loop, and the `serve` request loop.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use magi_core::{ControlCfg, Instrument, RawSampleStore, TemperatureController};
use magi_traits::{Heater, Sensor};

/// How often the hold loop checks for Ctrl-C and the deadline.
const POLL: Duration = Duration::from_millis(50);
const REPORT_EVERY: Duration = Duration::from_secs(1);

pub type Parts = (Box<dyn Sensor + Send>, Box<dyn Heater + Send>);

/// Pi peripherals with the `hardware` feature, otherwise one simulated plant.
pub fn make_hardware(cfg: &magi_config::Config) -> eyre::Result<Parts> {
    #[cfg(feature = "hardware")]
    {
        let sensor = magi_hardware::Mcp3008Sensor::new()?;
        let heater = magi_hardware::PwmHeater::new(
            cfg.pins.heater_pwm,
            cfg.pins.fan,
            cfg.hardware.pwm_frequency_hz,
        )?;
        tracing::info!(
            heater_pwm = cfg.pins.heater_pwm,
            fan = cfg.pins.fan,
            "hardware backend"
        );
        Ok((Box::new(sensor), Box::new(heater)))
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = cfg;
        let mut params = magi_hardware::SimParams::default();
        // Test hook: run the simulated plant faster than wall-clock time.
        if let Some(scale) = std::env::var("MAGI_SIM_TIME_SCALE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s > 0.0)
        {
            params.time_scale = scale;
        }
        tracing::info!(time_scale = params.time_scale, "simulated backend");
        let sim = magi_hardware::ThermalSim::new(params);
        Ok((Box::new(sim.sensor()), Box::new(sim.heater())))
    }
}

pub fn build_controller(cfg: &magi_config::Config) -> eyre::Result<TemperatureController> {
    let (sensor, heater) = make_hardware(cfg)?;
    TemperatureController::builder()
        .with_sensor(sensor)
        .with_heater(heater)
        .with_control(ControlCfg::from(cfg))
        .build()
}

#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub elapsed: Duration,
    pub temperature_c: f64,
    pub setpoint_c: f64,
    pub heater_faults: u64,
    pub interrupted: bool,
}

/// Hold `setpoint` for `duration` (or until `shutdown`), reporting once per
/// second. The heater is always off when this returns `Ok`.
pub fn run_hold(
    controller: &mut TemperatureController,
    setpoint: Option<f64>,
    duration: Duration,
    shutdown: &AtomicBool,
    json: bool,
) -> eyre::Result<RunOutcome> {
    if let Some(c) = setpoint {
        controller.set_desired_temperature(c)?;
    }
    controller.start()?;
    tracing::info!(
        setpoint_c = controller.desired_temperature(),
        duration_s = duration.as_secs(),
        "run start"
    );

    let started = Instant::now();
    let mut next_report = REPORT_EVERY;
    let interrupted = loop {
        if shutdown.load(Ordering::Relaxed) {
            break true;
        }
        let elapsed = started.elapsed();
        if elapsed >= duration {
            break false;
        }
        if elapsed >= next_report {
            report(controller, elapsed, json);
            next_report += REPORT_EVERY;
        }
        std::thread::sleep(POLL.min(duration - elapsed));
    };

    let status = controller.status();
    controller.stop()?;
    let outcome = RunOutcome {
        elapsed: started.elapsed(),
        temperature_c: status.measured_c,
        setpoint_c: status.desired_c,
        heater_faults: status.heater_faults,
        interrupted,
    };
    tracing::info!(
        temperature_c = outcome.temperature_c,
        interrupted,
        heater_faults = outcome.heater_faults,
        "run end"
    );
    Ok(outcome)
}

fn report(controller: &TemperatureController, elapsed: Duration, json: bool) {
    let s = controller.status();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "t_s": elapsed.as_secs(),
                "temperature_c": s.measured_c,
                "setpoint_c": s.desired_c,
            })
        );
    } else {
        println!(
            "{:>5}s  {:7.2} °C  (setpoint {:.1} °C)",
            elapsed.as_secs(),
            s.measured_c,
            s.desired_c
        );
    }
}

/// Store and log file for `serve`, from `[data]` and `[logging]`.
pub fn make_instrument(cfg: &magi_config::Config) -> eyre::Result<Instrument> {
    let controller = build_controller(cfg)?;
    let store = RawSampleStore::new(&cfg.data.directory, cfg.data.temp_file.clone());
    let log_file = cfg.logging.file.as_ref().map(std::path::PathBuf::from);
    Ok(Instrument::new(controller, store, log_file))
}

/// Answer one `[action, data]` line per input line until EOF. Failed actions
/// produce `{"error": ...}` and the loop carries on.
pub fn serve(
    instrument: &mut Instrument,
    input: impl BufRead,
    mut out: impl Write,
) -> eyre::Result<usize> {
    let mut handled = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match instrument.handle_json(&line) {
            Ok(reply) => serde_json::to_value(&reply)?,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        writeln!(out, "{reply}")?;
        out.flush()?;
        handled += 1;
    }
    Ok(handled)
}
