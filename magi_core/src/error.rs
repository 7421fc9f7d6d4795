use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MagiError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("temperature control already running")]
    AlreadyRunning,
    #[error("data error: {0}")]
    Data(String),
    #[error("io error: {0}")]
    Io(String),
}

impl MagiError {
    /// Errors that only cost the current control cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, MagiError::Timeout | MagiError::Hardware(_))
    }
}

impl From<std::io::Error> for MagiError {
    fn from(e: std::io::Error) -> Self {
        MagiError::Io(e.to_string())
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor")]
    MissingSensor,
    #[error("missing heater")]
    MissingHeater,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
