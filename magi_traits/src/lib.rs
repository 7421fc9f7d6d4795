//! Hardware seams for the MAGI instrument.
//!
//! The control loop only ever talks to the thermal hardware through these
//! traits, so the same loop runs against the simulated plant, test spies, and
//! the Raspberry Pi peripherals.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error crossing the hardware boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Analog input channels wired to the chip's temperature sensing bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Shared reference; subtracted from both measurement channels.
    Baseline,
    /// Sensor under the chip.
    Bottom,
    /// Sensor above the chip.
    Top,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Baseline, Channel::Bottom, Channel::Top];

    /// ADC input index.
    pub fn index(self) -> u8 {
        match self {
            Channel::Baseline => 0,
            Channel::Bottom => 1,
            Channel::Top => 2,
        }
    }
}

pub trait Sensor {
    /// Read one channel, normalized to [0, 1] of the ADC range.
    ///
    /// Implementations must give up once `timeout` has elapsed and report it
    /// as an error; the caller treats that as a transient failure.
    fn read_channel(&mut self, channel: Channel, timeout: std::time::Duration) -> HwResult<f64>;
}

pub trait Heater {
    /// Drive the heater PWM at `percent` duty, 0..=100.
    fn set_duty_cycle(&mut self, percent: f64) -> HwResult<()>;
    /// Switch the auxiliary cooling fan.
    fn set_auxiliary(&mut self, on: bool) -> HwResult<()>;
}

impl<T: Sensor + ?Sized> Sensor for Box<T> {
    fn read_channel(&mut self, channel: Channel, timeout: std::time::Duration) -> HwResult<f64> {
        (**self).read_channel(channel, timeout)
    }
}

impl<T: Heater + ?Sized> Heater for Box<T> {
    fn set_duty_cycle(&mut self, percent: f64) -> HwResult<()> {
        (**self).set_duty_cycle(percent)
    }
    fn set_auxiliary(&mut self, on: bool) -> HwResult<()> {
        (**self).set_auxiliary(on)
    }
}
