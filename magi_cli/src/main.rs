mod cli;
mod error_fmt;
mod rt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use magi_core::{AnalysisParams, WellLayout};
use magi_traits::Heater;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;

    match cli.cmd {
        Commands::Run {
            setpoint,
            duration_s,
            rt,
        } => {
            rt::setup_rt_once(&rt);
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = shutdown.clone();
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let mut controller = run::build_controller(&cfg)?;
            let out = run::run_hold(
                &mut controller,
                setpoint,
                Duration::from_secs(duration_s),
                &shutdown,
                cli.json,
            )?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": if out.interrupted { "interrupted" } else { "complete" },
                        "elapsed_s": out.elapsed.as_secs_f64(),
                        "temperature_c": out.temperature_c,
                        "setpoint_c": out.setpoint_c,
                        "heater_faults": out.heater_faults,
                    })
                );
            } else {
                let how = if out.interrupted { "interrupted" } else { "complete" };
                println!(
                    "run {how} after {:.1}s: {:.2} °C (setpoint {:.1} °C), heater off",
                    out.elapsed.as_secs_f64(),
                    out.temperature_c,
                    out.setpoint_c
                );
            }
        }
        Commands::Analyze {
            file,
            card,
            filter_factor,
            cut_time,
            threshold,
        } => {
            let card_text = std::fs::read_to_string(&card)
                .wrap_err_with(|| format!("read card {}", card.display()))?;
            let layout = WellLayout::from_card(&magi_config::load_card_json(&card_text)?)?;
            let defaults = AnalysisParams::from(&cfg.analysis);
            let params = AnalysisParams {
                filter_factor: filter_factor.unwrap_or(defaults.filter_factor),
                cut_time_min: cut_time.unwrap_or(defaults.cut_time_min),
                threshold: threshold.unwrap_or(defaults.threshold),
            };
            let span = tracing::info_span!("analyze", file = %file.display());
            let _enter = span.enter();
            let report = magi_core::analyze(&file, &params, &layout)?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Commands::Serve { rt } => {
            rt::setup_rt_once(&rt);
            let mut instrument = run::make_instrument(&cfg)?;
            let handled = run::serve(
                &mut instrument,
                std::io::stdin().lock(),
                std::io::stdout().lock(),
            )?;
            tracing::info!(handled, "input closed");
        }
        Commands::SelfCheck => {
            let control = magi_core::ControlCfg::from(&cfg);
            let (mut sensor, mut heater) = run::make_hardware(&cfg)?;
            let t = magi_core::control::read_temperature(sensor.as_mut(), &control)?;
            heater
                .set_duty_cycle(0.0)
                .map_err(|e| eyre::eyre!("heater did not accept duty 0: {e}"))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "status": "ok", "temperature_c": t })
                );
            } else {
                println!("OK: chip at {t:.2} °C, heater responding");
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<magi_config::Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .wrap_err_with(|| format!("read config {}", p.display()))?;
            magi_config::load_toml(&text).wrap_err("invalid configuration")?
        }
        None => magi_config::Config::default(),
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout stays machine-readable; `[logging].file`
/// adds a JSON-lines file sink.
fn init_tracing(json: bool, cli_level: Option<&str>, logging: &magi_config::Logging) -> Result<()> {
    use tracing_appender::rolling;
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = cli_level.or(logging.level.as_deref()).unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level)
            .wrap_err_with(|| format!("invalid log level {level:?}"))?,
    };

    let (console_json, console_text) = if json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_target(false).with_writer(std::io::stderr)))
    };

    let file_layer = match logging.file.as_deref() {
        Some(path) => {
            let p = Path::new(path);
            let dir = p
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = p
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {path:?} has no file name"))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => rolling::daily(dir, name),
                Some("hourly") => rolling::hourly(dir, name),
                _ => rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_text)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("tracing init failed: {e}"))
}
