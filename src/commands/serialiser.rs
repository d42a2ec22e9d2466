//! Command serialiser for AT command lines
//!
//! Builds `AT<mnemonic><suffix><value>\r` lines and formats the structured
//! values (EUIs, keys, device address, binary payloads) the modem expects.

use crate::commands::types::{CommandForm, CommandId};
use crate::config::modem::MAX_COMMAND_LEN;
use crate::error::ModemError;
use heapless::{String, Vec};

/// Encoded command line ready for the transport
pub type CommandLine = Vec<u8, MAX_COMMAND_LEN>;

/// Formatted command value
pub type CommandValue = Vec<u8, MAX_COMMAND_LEN>;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Serialiser for outbound AT commands
pub struct CommandSerialiser;

impl CommandSerialiser {
    /// Create a new command serialiser
    pub fn new() -> Self {
        Self
    }

    /// Encode a command line.
    ///
    /// Only the `Set` form carries a value, and it requires one. Unsupported
    /// command/form pairs are rejected with `InvalidParam`.
    pub fn encode(
        &self,
        id: CommandId,
        form: CommandForm,
        value: Option<&[u8]>,
    ) -> Result<CommandLine, ModemError> {
        if !id.supports(form) {
            return Err(ModemError::InvalidParam);
        }
        match (form, value) {
            (CommandForm::Set, None) => return Err(ModemError::InvalidParam),
            (CommandForm::Set, Some(_)) | (_, None) => {}
            (_, Some(_)) => return Err(ModemError::InvalidParam),
        }

        let mut line = CommandLine::new();
        push_all(&mut line, b"AT")?;
        push_all(&mut line, id.mnemonic().as_bytes())?;
        push_all(&mut line, form.suffix().as_bytes())?;
        if let Some(value) = value {
            push_all(&mut line, value)?;
        }
        push_all(&mut line, b"\r")?;
        Ok(line)
    }
}

impl Default for CommandSerialiser {
    fn default() -> Self {
        Self::new()
    }
}

fn push_all<const N: usize>(buf: &mut Vec<u8, N>, data: &[u8]) -> Result<(), ModemError> {
    buf.extend_from_slice(data).map_err(|_| ModemError::Overflow)
}

fn push_hex_byte<const N: usize>(buf: &mut Vec<u8, N>, byte: u8) -> Result<(), ModemError> {
    push_all(
        buf,
        &[
            HEX_DIGITS[(byte >> 4) as usize],
            HEX_DIGITS[(byte & 0x0F) as usize],
        ],
    )
}

/// Format octets as colon-separated uppercase hex (`01:AB:...`)
pub fn format_hex_octets(octets: &[u8]) -> Result<CommandValue, ModemError> {
    let mut out = CommandValue::new();
    for (i, &byte) in octets.iter().enumerate() {
        if i > 0 {
            push_all(&mut out, b":")?;
        }
        push_hex_byte(&mut out, byte)?;
    }
    Ok(out)
}

/// Format a device address, most significant octet first
pub fn format_dev_addr(addr: u32) -> Result<CommandValue, ModemError> {
    format_hex_octets(&addr.to_be_bytes())
}

/// Format a decimal number
pub fn format_number(value: u32) -> Result<CommandValue, ModemError> {
    use core::fmt::Write;

    let mut text: String<10> = String::new();
    write!(text, "{}", value).map_err(|_| ModemError::Overflow)?;
    let mut out = CommandValue::new();
    push_all(&mut out, text.as_bytes())?;
    Ok(out)
}

/// Format the value of a binary send: `<port>:<0|1>:<HEX>`
///
/// The payload is two uppercase hex digits per byte with no separators.
pub fn format_send_value(
    port: u8,
    confirmed: bool,
    payload: &[u8],
) -> Result<CommandValue, ModemError> {
    let mut out = format_number(port as u32)?;
    push_all(&mut out, b":")?;
    push_all(&mut out, if confirmed { b"1" } else { b"0" })?;
    push_all(&mut out, b":")?;
    for &byte in payload {
        push_hex_byte(&mut out, byte)?;
    }
    Ok(out)
}
