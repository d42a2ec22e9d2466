//! Quiescence reader
//!
//! The modem link has no end-of-response marker. The reader polls the
//! transport in fixed time slices and treats a slice in which the buffer
//! did not grow as the end of the burst. Every wait is bounded by the
//! window's timeout.

use crate::config::modem::{RESPONSE_TIMEOUT_MS, RX_BUFFER_LEN, TIME_SLICES, URC_POLL_TIMEOUT_MS};
use crate::error::ModemError;
use crate::modem::traits::ModemTransport;
use heapless::Vec;

/// Receive accumulator for one transaction
pub type RxBuffer = Vec<u8, RX_BUFFER_LEN>;

/// Bounded polling window: `slices` polls spread over `timeout_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWindow {
    pub timeout_ms: u32,
    pub slices: u32,
}

impl PollWindow {
    pub const fn new(timeout_ms: u32, slices: u32) -> Self {
        Self { timeout_ms, slices }
    }

    /// Idle-line window used to harvest URCs
    pub const fn urc_poll() -> Self {
        Self::new(URC_POLL_TIMEOUT_MS, TIME_SLICES)
    }

    /// Window for a command response
    pub const fn response() -> Self {
        Self::new(RESPONSE_TIMEOUT_MS, TIME_SLICES)
    }

    /// Effective slice count, at least one
    pub fn slice_count(&self) -> u32 {
        self.slices.max(1)
    }

    /// Sleep between polls
    pub fn slice_ms(&self) -> u32 {
        self.timeout_ms / self.slice_count()
    }
}

/// When an unchanged buffer counts as quiescent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiescencePolicy {
    /// Stop on the first slice without new bytes, even if nothing arrived
    StopWhenIdle,
    /// Keep waiting until the first byte arrives, then stop when idle
    AwaitFirstByte,
}

/// Summary of one quiescence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// Slices slept through
    pub slices_used: u32,
    /// Transport time spent waiting
    pub elapsed_ms: u64,
    /// Bytes appended during this wait
    pub bytes_read: usize,
    /// Stopped because the line went quiet, not because the window ran out
    pub settled: bool,
    /// Buffer filled up and input was truncated
    pub overflowed: bool,
}

/// Polls the transport until the line goes quiet
pub struct QuiescenceReader {
    policy: QuiescencePolicy,
}

impl QuiescenceReader {
    pub fn new(policy: QuiescencePolicy) -> Self {
        Self { policy }
    }

    /// Reader for harvesting pending URCs
    pub fn idle_poll() -> Self {
        Self::new(QuiescencePolicy::StopWhenIdle)
    }

    /// Reader for the wait after a command is written
    pub fn response() -> Self {
        Self::new(QuiescencePolicy::AwaitFirstByte)
    }

    pub fn policy(&self) -> QuiescencePolicy {
        self.policy
    }

    /// Append transport bytes to `buf` until quiescence or the window ends.
    ///
    /// Each slice sleeps `timeout_ms / slices`, then reads whatever has
    /// arrived. Returns early once a slice adds no bytes. A transport that
    /// never goes quiet yields the partial buffer after `slices` polls.
    pub async fn await_quiescent<T: ModemTransport>(
        &self,
        transport: &mut T,
        buf: &mut RxBuffer,
        window: PollWindow,
    ) -> Result<PollReport, ModemError> {
        let slice_ms = window.slice_ms();
        let started_at = transport.now_ms();
        let start_len = buf.len();
        let mut previous = start_len;

        let mut report = PollReport {
            slices_used: 0,
            elapsed_ms: 0,
            bytes_read: 0,
            settled: false,
            overflowed: false,
        };

        for slice in 1..=window.slice_count() {
            transport.delay_ms(slice_ms).await;
            report.slices_used = slice;

            read_available(transport, buf).await?;

            if buf.len() == buf.capacity() {
                log::warn!("Receive buffer full, truncating modem output");
                report.overflowed = true;
                break;
            }

            let unchanged = buf.len() == previous;
            let waiting_for_first = self.policy == QuiescencePolicy::AwaitFirstByte
                && buf.len() == start_len;
            if unchanged && !waiting_for_first {
                report.settled = true;
                break;
            }
            previous = buf.len();
        }

        report.bytes_read = buf.len() - start_len;
        report.elapsed_ms = transport.now_ms().saturating_sub(started_at);
        Ok(report)
    }
}

impl Default for QuiescenceReader {
    fn default() -> Self {
        Self::idle_poll()
    }
}

/// Read everything available into the free space of `buf`
async fn read_available<T: ModemTransport>(
    transport: &mut T,
    buf: &mut RxBuffer,
) -> Result<usize, ModemError> {
    let filled = buf.len();
    if filled == buf.capacity() {
        return Ok(0);
    }

    // Expose the free tail as a slice, then trim back to what was read
    let _ = buf.resize(buf.capacity(), 0);
    let result = transport.read(&mut buf[filled..]).await;
    let count = match &result {
        Ok(n) => (*n).min(buf.capacity() - filled),
        Err(_) => 0,
    };
    buf.truncate(filled + count);

    result.map(|_| count).map_err(ModemError::from)
}
