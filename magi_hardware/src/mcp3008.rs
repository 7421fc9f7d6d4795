use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{HwError, Result};
use magi_traits::{Channel, HwResult, Sensor};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

const SPI_CLOCK_HZ: u32 = 1_350_000;
const MAX_ATTEMPTS: u32 = 3;

/// MCP3008 10-bit ADC on SPI0/CE0, single-ended inputs.
pub struct Mcp3008Sensor {
    spi: Spi,
}

impl Mcp3008Sensor {
    pub fn new() -> Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi })
    }

    /// One conversion; fails with `Timeout` if the transfer overran `deadline`.
    fn read_raw(&mut self, input: u8, deadline: Instant) -> Result<u16> {
        let tx = [0x01, (0x08 | (input & 0x07)) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        if Instant::now() > deadline {
            return Err(HwError::Timeout);
        }
        let raw = (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]);
        trace!(input, raw, "mcp3008 conversion");
        Ok(raw)
    }
}

impl Sensor for Mcp3008Sensor {
    fn read_channel(&mut self, channel: Channel, timeout: Duration) -> HwResult<f64> {
        let mut attempts = 0;
        loop {
            let deadline = Instant::now() + timeout;
            match self.read_raw(channel.index(), deadline) {
                Ok(raw) => return Ok(f64::from(raw) / 1023.0),
                Err(HwError::Timeout) if attempts < MAX_ATTEMPTS => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, ?channel, "adc timeout, retrying");
                }
                Err(e) => {
                    tracing::error!(?channel, "adc read error: {}", e);
                    return Err(Box::new(e));
                }
            }
        }
    }
}
