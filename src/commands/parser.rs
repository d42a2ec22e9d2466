//! Response parser for AT command values
//!
//! Decodes the value lines of a GET transaction according to the
//! command's response shape. Partial matches are rejected.

use crate::commands::types::{
    CommandForm, CommandId, DecodedValue, ModemVersions, ResponseShape, Version,
};
use crate::error::ModemError;
use heapless::Vec;

/// Widest hex field (keys)
const MAX_HEX_GROUPS: usize = 16;

/// Version line prefixes in `AT+VER=?` output
const APP_VERSION: &str = "APP_VERSION:";
const M4_APP_VERSION: &str = "M4 APP_VERSION:";
const M0PLUS_APP_VERSION: &str = "M0PLUS_APP_VERSION:";
const MW_LORAWAN_VERSION: &str = "MW_LORAWAN_VERSION:";
const MW_RADIO_VERSION: &str = "MW_RADIO_VERSION:";

/// Parser for AT response values
pub struct CommandParser;

impl CommandParser {
    /// Create a new command parser
    pub fn new() -> Self {
        Self
    }

    /// Decode the payload of a completed transaction.
    ///
    /// Forms other than `Get` carry only a completion code and decode to
    /// [`DecodedValue::None`].
    pub fn decode(
        &self,
        id: CommandId,
        form: CommandForm,
        raw: &[u8],
    ) -> Result<DecodedValue, ModemError> {
        if form != CommandForm::Get {
            return Ok(DecodedValue::None);
        }

        let text = core::str::from_utf8(raw).map_err(|_| ModemError::Parse)?;

        match id.response_shape() {
            ResponseShape::None => Ok(DecodedValue::None),
            ResponseShape::HexGroups(expected) => {
                let groups = scan_hex_groups(first_line(text)?)?;
                if groups.len() != expected {
                    log::warn!(
                        "{}: expected {} hex groups, scanned {}",
                        id.mnemonic(),
                        expected,
                        groups.len()
                    );
                    return Err(ModemError::Parse);
                }
                match expected {
                    4 => Ok(DecodedValue::DevAddr(u32::from_be_bytes([
                        groups[0], groups[1], groups[2], groups[3],
                    ]))),
                    8 => {
                        let mut eui = [0u8; 8];
                        eui.copy_from_slice(&groups);
                        Ok(DecodedValue::Eui(eui))
                    }
                    16 => {
                        let mut key = [0u8; 16];
                        key.copy_from_slice(&groups);
                        Ok(DecodedValue::Key(key))
                    }
                    _ => Err(ModemError::Parse),
                }
            }
            ResponseShape::Number => parse_number(first_line(text)?).map(DecodedValue::Number),
            ResponseShape::TextBlock => parse_versions(text).map(DecodedValue::Versions),
        }
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

fn first_line(text: &str) -> Result<&str, ModemError> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(ModemError::Parse)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode one hex pair, as used by downlink payloads
pub fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    Some((hex_value(hi)? << 4) | hex_value(lo)?)
}

/// Scan colon-separated hex octets (`01:AB:...`), one or two digits each.
///
/// Scanning stops at the first malformed group; the caller compares the
/// returned count against the field width.
pub fn scan_hex_groups(text: &str) -> Result<Vec<u8, MAX_HEX_GROUPS>, ModemError> {
    let mut groups = Vec::new();

    for group in text.trim().split(':') {
        let digits = group.as_bytes();
        let value = match digits {
            [d] => hex_value(*d),
            [hi, lo] => hex_pair(*hi, *lo),
            _ => None,
        };
        match value {
            Some(v) => groups.push(v).map_err(|_| ModemError::Parse)?,
            None => break,
        }
    }

    Ok(groups)
}

/// Parse a leading decimal number, allowing a `:label` suffix (`5:EU868`)
fn parse_number(text: &str) -> Result<u32, ModemError> {
    let digits_end = text
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, rest) = text.split_at(digits_end);
    if digits.is_empty() || !(rest.is_empty() || rest.starts_with(':')) {
        return Err(ModemError::Parse);
    }
    digits.parse().map_err(|_| ModemError::Parse)
}

/// Parse `V1.2.3` (leading `V` optional)
fn parse_version(text: &str) -> Result<Version, ModemError> {
    let text = text.trim();
    let text = text
        .strip_prefix('V')
        .or_else(|| text.strip_prefix('v'))
        .unwrap_or(text);

    let mut parts = text.split('.').map(|p| p.trim().parse::<u8>());
    let (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch)), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ModemError::Parse);
    };

    Ok(Version {
        major,
        minor,
        patch,
    })
}

/// Parse the multi-line `AT+VER=?` block. The application version is required.
fn parse_versions(text: &str) -> Result<ModemVersions, ModemError> {
    let mut versions = ModemVersions::default();
    let mut found_app = false;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(APP_VERSION) {
            versions.app = parse_version(rest)?;
            found_app = true;
        } else if let Some(rest) = line.strip_prefix(M4_APP_VERSION) {
            versions.m4_app = parse_version(rest)?;
        } else if let Some(rest) = line.strip_prefix(M0PLUS_APP_VERSION) {
            versions.m0plus_app = parse_version(rest)?;
        } else if let Some(rest) = line.strip_prefix(MW_LORAWAN_VERSION) {
            versions.mw_lorawan = parse_version(rest)?;
        } else if let Some(rest) = line.strip_prefix(MW_RADIO_VERSION) {
            versions.mw_radio = parse_version(rest)?;
        }
    }

    if found_app {
        Ok(versions)
    } else {
        Err(ModemError::Parse)
    }
}
