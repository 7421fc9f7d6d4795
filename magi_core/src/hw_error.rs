//! Maps `Box<dyn Error>` from trait boundaries to typed `MagiError`.
//!
//! The traits in `magi_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `magi_hardware::HwError`.

use crate::error::MagiError;

/// Map a trait-boundary error to a typed `MagiError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> MagiError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<magi_hardware::error::HwError>() {
            return match hw {
                magi_hardware::error::HwError::Timeout => MagiError::Timeout,
                magi_hardware::error::HwError::Io(io) => MagiError::Io(io.to_string()),
                other => MagiError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        MagiError::Timeout
    } else {
        MagiError::Hardware(s)
    }
}

/// Same as `map_hw_error` for the boxed form handed back by the traits.
pub(crate) fn map_boxed(e: &(dyn std::error::Error + Send + Sync + 'static)) -> MagiError {
    map_hw_error(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_text_maps_to_timeout() {
        let e = std::io::Error::other("adc read timed out");
        assert!(matches!(map_hw_error(&e), MagiError::Timeout));
    }

    #[test]
    fn sensor_read_failures_are_transient_but_bad_data_is_not() {
        let timeout = std::io::Error::other("adc read timed out");
        assert!(map_hw_error(&timeout).is_transient());
        let bus = std::io::Error::other("spi bus busy");
        assert!(map_hw_error(&bus).is_transient());
        assert!(!MagiError::Data("non-finite temperature NaN".into()).is_transient());
        assert!(!MagiError::HardwareFault("pwm".into()).is_transient());
    }

    #[test]
    fn other_text_maps_to_hardware() {
        let e = std::io::Error::other("spi bus busy");
        match map_hw_error(&e) {
            MagiError::Hardware(msg) => assert!(msg.contains("spi bus busy")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hw_timeout_is_downcast() {
        let e = magi_hardware::error::HwError::Timeout;
        assert!(matches!(map_hw_error(&e), MagiError::Timeout));
    }
}
