//! Response and unsolicited result code (URC) classification
//!
//! Every tokenized line is either a completion line that ends a transaction
//! or an entry from a fixed catalogue of unsolicited events. Matching is by
//! prefix, in catalogue order, so longer prefixes are tested before the
//! shorter ones they contain:
//!
//! | Prefix                 | Classification                 |
//! |------------------------|--------------------------------|
//! | `+EVT:JOINED`          | `Joined(true)`                 |
//! | `+EVT:JOIN FAILED`     | `Joined(false)`                |
//! | `JOINED`               | `Joined(true)` (legacy)        |
//! | `+EVT:SEND_CONFIRMED`  | `SendConfirmed`                |
//! | `+EVT:RX_`             | `ReceiveSlotInfo`              |
//! | `+EVT:`                | `Downlink` (port:len:hex)      |
//! | `AT_NO_NETWORK_JOINED` | `NoNetworkJoined`              |
//! | `AT_BUSY_ERROR`        | `BusyError`                    |
//! | `<d>s<ddd>:`           | `Trace` (verbose modem output) |

use crate::commands::parser::hex_pair;
use crate::config::modem::MAX_LINE_LEN;
use crate::config::payload::MAX_LORA_PAYLOAD;
use heapless::{String, Vec};

/// Copy of a raw line kept for logging
pub type RawLine = String<MAX_LINE_LEN>;

/// Tokens that end a transaction successfully
const OK_TOKEN: &str = "OK";

/// Tokens that end a transaction with an error
const ERROR_TOKENS: [&str; 5] = [
    "AT_ERROR",
    "AT_PARAM_ERROR",
    "AT_TEST_PARAM_OVERFLOW",
    "AT_RX_ERROR",
    "ERROR",
];

const EVT_JOINED: &str = "+EVT:JOINED";
const EVT_JOIN_FAILED: &str = "+EVT:JOIN FAILED";
const LEGACY_JOINED: &str = "JOINED";
const EVT_SEND_CONFIRMED: &str = "+EVT:SEND_CONFIRMED";
const EVT_RX_SLOT: &str = "+EVT:RX_";
const EVT_PREFIX: &str = "+EVT:";
const NO_NETWORK_JOINED: &str = "AT_NO_NETWORK_JOINED";
const BUSY_ERROR: &str = "AT_BUSY_ERROR";

/// Furthest offset at which a verbose trace timestamp may start
const TRACE_MAX_OFFSET: usize = 5;

/// Transaction completion code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    Ok,
    Error,
}

/// Application downlink delivered by the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    pub port: u8,
    pub payload: Vec<u8, MAX_LORA_PAYLOAD>,
}

/// Unsolicited event kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrcKind {
    /// Join outcome (`true` on accept)
    Joined(bool),
    /// Modem reports that it is not joined
    NoNetworkJoined,
    /// Confirmed uplink acknowledged by the network
    SendConfirmed,
    /// Radio busy, command rejected
    BusyError,
    Downlink(Downlink),
    /// Receive window diagnostics
    ReceiveSlotInfo(RawLine),
    /// Timestamped verbose trace from the modem
    Trace(RawLine),
    Unrecognized(RawLine),
}

/// Result of classifying one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Completion(CompletionCode),
    Urc(UrcKind),
}

/// Join outcome reported to the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Join accept received
    Accepted,
    /// Join attempt failed
    Failed,
    /// Modem is not joined to a network
    NoNetwork,
}

/// Receives dispatched URCs
pub trait UrcHandler {
    fn on_joined(&mut self, outcome: JoinOutcome);
    fn on_send_confirmed(&mut self);
    fn on_busy_error(&mut self);
    fn on_downlink(&mut self, downlink: &Downlink);
}

/// Classify a single tokenized line
pub fn classify(line: &str) -> Classified {
    if line.starts_with(OK_TOKEN) {
        return Classified::Completion(CompletionCode::Ok);
    }
    if ERROR_TOKENS.iter().any(|token| line.starts_with(token)) {
        return Classified::Completion(CompletionCode::Error);
    }
    Classified::Urc(classify_urc(line))
}

fn classify_urc(line: &str) -> UrcKind {
    if line.starts_with(EVT_JOINED) {
        UrcKind::Joined(true)
    } else if line.starts_with(EVT_JOIN_FAILED) {
        UrcKind::Joined(false)
    } else if line.starts_with(LEGACY_JOINED) {
        UrcKind::Joined(true)
    } else if line.starts_with(EVT_SEND_CONFIRMED) {
        UrcKind::SendConfirmed
    } else if line.starts_with(EVT_RX_SLOT) {
        UrcKind::ReceiveSlotInfo(raw_line(line))
    } else if let Some(body) = line.strip_prefix(EVT_PREFIX) {
        match parse_downlink(body) {
            Some(downlink) => UrcKind::Downlink(downlink),
            None => {
                log::warn!("Dropping malformed downlink: {}", line);
                UrcKind::Unrecognized(raw_line(line))
            }
        }
    } else if line.starts_with(NO_NETWORK_JOINED) {
        UrcKind::NoNetworkJoined
    } else if line.starts_with(BUSY_ERROR) {
        UrcKind::BusyError
    } else if is_trace(line) {
        UrcKind::Trace(raw_line(line))
    } else {
        UrcKind::Unrecognized(raw_line(line))
    }
}

fn raw_line(line: &str) -> RawLine {
    let mut raw = RawLine::new();
    for c in line.chars() {
        if raw.push(c).is_err() {
            break;
        }
    }
    raw
}

/// Parse `<port>:<len>:<hex>` (decimal port and length).
///
/// Exactly `len` hex pairs must decode; anything less yields `None`.
fn parse_downlink(body: &str) -> Option<Downlink> {
    let mut fields = body.splitn(3, ':');
    let port: u8 = fields.next()?.trim().parse().ok()?;
    let len: usize = fields.next()?.trim().parse().ok()?;
    let hex = fields.next().unwrap_or("").trim().as_bytes();

    if len > MAX_LORA_PAYLOAD || hex.len() < len * 2 {
        return None;
    }

    let mut payload = Vec::new();
    for pair in hex[..len * 2].chunks_exact(2) {
        payload.push(hex_pair(pair[0], pair[1])?).ok()?;
    }

    Some(Downlink { port, payload })
}

/// Verbose modem trace: `<digit>s<digit><digit><digit>:` near the start of the line
fn is_trace(line: &str) -> bool {
    let bytes = line.as_bytes();
    (0..=TRACE_MAX_OFFSET).any(|i| match bytes.get(i..i + 6) {
        Some([a, b's', c, d, e, b':']) => {
            a.is_ascii_digit() && c.is_ascii_digit() && d.is_ascii_digit() && e.is_ascii_digit()
        }
        _ => false,
    })
}

/// Route a classified URC to the handler
pub fn dispatch(kind: &UrcKind, handler: &mut dyn UrcHandler) {
    match kind {
        UrcKind::Joined(true) => {
            log::info!("URC: network joined");
            handler.on_joined(JoinOutcome::Accepted);
        }
        UrcKind::Joined(false) => {
            log::info!("URC: join failed");
            handler.on_joined(JoinOutcome::Failed);
        }
        UrcKind::NoNetworkJoined => {
            log::info!("URC: no network joined");
            handler.on_joined(JoinOutcome::NoNetwork);
        }
        UrcKind::SendConfirmed => {
            log::info!("URC: uplink acknowledged");
            handler.on_send_confirmed();
        }
        UrcKind::BusyError => {
            log::warn!("URC: radio busy");
            handler.on_busy_error();
        }
        UrcKind::Downlink(downlink) => {
            log::info!(
                "URC: downlink port {} ({} bytes)",
                downlink.port,
                downlink.payload.len()
            );
            handler.on_downlink(downlink);
        }
        UrcKind::ReceiveSlotInfo(line) => log::debug!("URC: {}", line),
        UrcKind::Trace(line) => log::debug!("Modem trace: {}", line),
        UrcKind::Unrecognized(line) => log::debug!("URC not recognised: {}", line),
    }
}
