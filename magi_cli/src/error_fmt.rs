//! Human-readable error descriptions and structured JSON error formatting.

use magi_core::error::{BuildError, MagiError};

/// Stable name of a typed error for JSON output.
pub fn error_reason_name(e: &MagiError) -> &'static str {
    match e {
        MagiError::Hardware(_) => "Hardware",
        MagiError::HardwareFault(_) => "HardwareFault",
        MagiError::Timeout => "Timeout",
        MagiError::Config(_) => "Config",
        MagiError::AlreadyRunning => "AlreadyRunning",
        MagiError::Data(_) => "Data",
        MagiError::Io(_) => "Io",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor => {
                "What happened: No temperature sensor was provided to the controller.\nLikely causes: The ADC failed to initialize or was not wired into the builder.\nHow to fix: Ensure the sensor is created successfully and passed via with_sensor(...).".to_string()
            }
            BuildError::MissingHeater => {
                "What happened: No heater was provided to the controller.\nLikely causes: The PWM heater failed to initialize or was not wired into the builder.\nHow to fix: Ensure the heater is created successfully and passed via with_heater(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid control configuration ({msg}).\nLikely causes: Missing or out-of-range values in [control].\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MagiError>() {
        return match me {
            MagiError::Timeout => "What happened: A sensor read timed out.\nLikely causes: MCP3008 not wired correctly, SPI disabled, or the timeout is too low.\nHow to fix: Check SPI wiring and power, and consider raising hardware.sensor_read_timeout_ms.".to_string(),
            MagiError::Hardware(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wrong pins, missing SPI/GPIO permissions, or a loose connection.\nHow to fix: Check [pins] in the config and that the process may access /dev/spidev0.0 and GPIO."
            ),
            MagiError::HardwareFault(msg) => format!(
                "What happened: The heater could not be switched off ({msg}).\nLikely causes: GPIO failure while shutting down.\nHow to fix: Cut heater power manually before touching the chip, then check the PWM wiring."
            ),
            MagiError::AlreadyRunning => "What happened: The temperature loop is already running.\nLikely causes: start was requested twice.\nHow to fix: End the current assay first.".to_string(),
            MagiError::Config(msg) => format!(
                "What happened: Invalid request or configuration ({msg}).\nLikely causes: Out-of-range analysis parameters or a malformed card.\nHow to fix: Correct the value and try again."
            ),
            MagiError::Data(msg) => format!(
                "What happened: The assay data could not be analyzed ({msg}).\nLikely causes: Too few samples after the warm-up cut, or a card with more wells than the file has columns.\nHow to fix: Check the raw file and the card, or lower --cut-time."
            ),
            MagiError::Io(msg) => format!(
                "What happened: File error ({msg}).\nLikely causes: Missing data directory or insufficient permissions.\nHow to fix: Check data.directory in the config."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("spi error") || lower.contains("gpio error") {
        return "What happened: Failed to initialize hardware.\nLikely causes: SPI not enabled, incorrect pin numbers, or insufficient permissions.\nHow to fix: Enable SPI (raspi-config), fix [pins], and run as a user in the spi/gpio groups.".to_string();
    }

    if lower.contains("invalid configuration") {
        let cause = err
            .chain()
            .nth(1)
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        return format!(
            "What happened: Configuration is invalid{cause}.\nLikely causes: Out-of-range values or a typo in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    if lower.contains("card json") || lower.contains("well_config") {
        return format!(
            "What happened: The assay card could not be read ({msg}).\nLikely causes: Missing well_config or a ragged grid.\nHow to fix: Re-export the card from the client."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map typed errors to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<MagiError>() {
        Some(MagiError::Timeout | MagiError::Hardware(_)) => 3,
        Some(MagiError::HardwareFault(_)) => 4,
        Some(MagiError::Data(_)) => 5,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match (err.downcast_ref::<MagiError>(), err.downcast_ref::<BuildError>()) {
        (Some(me), _) => error_reason_name(me),
        (None, Some(_)) => "Build",
        (None, None) => "Error",
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_get_specific_hints_and_codes() {
        let e: eyre::Report = MagiError::Timeout.into();
        assert!(humanize(&e).contains("sensor_read_timeout_ms"));
        assert_eq!(exit_code_for_error(&e), 3);

        let e: eyre::Report = MagiError::Data("need at least 2 samples".into()).into();
        assert_eq!(exit_code_for_error(&e), 5);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Data");
        assert!(v["message"].as_str().unwrap().contains("need at least 2 samples"));
    }

    #[test]
    fn wrapped_config_errors_show_the_cause() {
        let e = eyre::eyre!("control.bias must be in [0.0, 1.0]").wrap_err("invalid configuration");
        let text = humanize(&e);
        assert!(text.starts_with("What happened: Configuration is invalid"));
        assert!(text.contains("control.bias"));
        assert_eq!(exit_code_for_error(&e), 1);
    }
}
