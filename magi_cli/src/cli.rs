//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "magi", version, about = "MAGI instrument CLI")]
pub struct Cli {
    /// Path to config TOML; built-in instrument defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            RtLock::Current
        } else {
            RtLock::None
        }
    }
}

/// Real-time knobs shared by the long-running commands.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct RtArgs {
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: attempts SCHED_FIFO priority, pins the process to one CPU and locks its memory with mlockall, so the heater loop keeps its 50 ms period under load. Needs CAP_SYS_NICE/CAP_IPC_LOCK or root.\n\nOther OSes: only memory locking is attempted."
    )]
    pub rt: bool,
    /// SCHED_FIFO priority (Linux only); defaults to the system maximum
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin to (Linux only); defaults to 0
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Hold the chip at a temperature for a while, printing it once per second
    Run {
        /// Desired temperature, °C (defaults to control.setpoint_c)
        #[arg(long, value_name = "CELSIUS")]
        setpoint: Option<f64>,
        /// How long to run before switching the heater off
        #[arg(long, value_name = "SECONDS", default_value_t = 60)]
        duration_s: u64,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Filter a raw assay file and report per-well time-to-positive
    Analyze {
        /// Raw CSV written by an assay (`timestamp,v1,..,vN` rows)
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// Assay card JSON describing the well grid
        #[arg(long, value_name = "FILE")]
        card: PathBuf,
        /// Low-pass aggressiveness (>= 1); overrides analysis.filter_factor
        #[arg(long, value_name = "F")]
        filter_factor: Option<f64>,
        /// Warm-up minutes to discard; overrides analysis.cut_time_min
        #[arg(long, value_name = "MINUTES")]
        cut_time: Option<f64>,
        /// Noise gate on the raw maximum; overrides analysis.threshold
        #[arg(long, value_name = "LEVEL")]
        threshold: Option<f64>,
    },
    /// Execute one `[action, data]` JSON request per stdin line
    Serve {
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Validate the config and take one temperature reading
    SelfCheck,
}
