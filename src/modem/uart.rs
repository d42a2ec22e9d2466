//! UART modem transport
//!
//! Implements [`ModemTransport`] over any async UART that can report
//! pending receive data, plus a push-pull reset line and the embassy
//! time driver.

use crate::modem::traits::{ModemTransport, TransportError};
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::OutputPin;
use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};

/// STM32WL link over UART with a reset GPIO
pub struct UartTransport<U, Rst>
where
    U: Read + Write + ReadReady,
    Rst: OutputPin,
{
    uart: U,
    reset: Rst,
    initialised: bool,
}

impl<U, Rst> UartTransport<U, Rst>
where
    U: Read + Write + ReadReady,
    Rst: OutputPin,
{
    pub fn new(uart: U, reset: Rst) -> Self {
        Self {
            uart,
            reset,
            initialised: false,
        }
    }

    /// Consume the transport and return the UART and reset pin
    pub fn release(self) -> (U, Rst) {
        (self.uart, self.reset)
    }

    fn ensure_initialised(&self) -> Result<(), TransportError> {
        if self.initialised {
            Ok(())
        } else {
            Err(TransportError::NotInitialised)
        }
    }
}

impl<U, Rst> ModemTransport for UartTransport<U, Rst>
where
    U: Read + Write + ReadReady,
    Rst: OutputPin,
{
    async fn init(&mut self) -> Result<(), TransportError> {
        // Release reset so the modem runs
        self.reset
            .set_high()
            .map_err(|_| TransportError::ResetFailed)?;
        self.initialised = true;
        Ok(())
    }

    async fn deinit(&mut self) -> Result<(), TransportError> {
        self.initialised = false;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_initialised()?;
        self.uart
            .write_all(data)
            .await
            .map_err(|_| TransportError::WriteFailed)?;
        self.uart
            .flush()
            .await
            .map_err(|_| TransportError::WriteFailed)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.ensure_initialised()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let mut count = 0;
        while count < buf.len() {
            let ready = self
                .uart
                .read_ready()
                .map_err(|_| TransportError::ReadFailed)?;
            if !ready {
                break;
            }
            let n = self
                .uart
                .read(&mut buf[count..])
                .await
                .map_err(|_| TransportError::ReadFailed)?;
            if n == 0 {
                break;
            }
            count += n;
        }
        Ok(count)
    }

    async fn reset(&mut self, level: bool) -> Result<(), TransportError> {
        let result = if level {
            self.reset.set_high()
        } else {
            self.reset.set_low()
        };
        result.map_err(|_| TransportError::ResetFailed)
    }

    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    async fn delay_ms(&mut self, ms: u32) {
        Timer::after(Duration::from_millis(ms as u64)).await;
    }
}
