//! Command and response types for the STM32WL AT protocol
//!
//! # Wire Format
//!
//! Commands are ASCII lines terminated by a carriage return:
//! ```text
//! AT<mnemonic>[<suffix><value>]\r
//! ```
//!
//! | Form    | Suffix | Example              |
//! |---------|--------|----------------------|
//! | Control | none   | `AT\r`, `ATZ\r`      |
//! | Set     | `=`    | `AT+JOIN=1\r`        |
//! | Get     | `=?`   | `AT+DEUI=?\r`        |
//! | Test    | `?`    | `AT+DR?\r`           |
//!
//! Responses are CRLF-delimited lines. A completed transaction ends with
//! `OK` or an error token such as `AT_ERROR`. Unsolicited lines use the
//! `+EVT:` prefix, or a bare keyword on older modem firmware.

use crate::config::modem::RX_BUFFER_LEN;
use heapless::Vec;

/// Command identifiers understood by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    /// Liveness probe (`AT`)
    Ping,
    /// Soft reset (`ATZ`)
    Reset,
    /// Start a network join, OTAA or ABP
    Join,
    /// Network join status query
    JoinStatus,
    DeviceEui,
    AppEui,
    AppKey,
    NwkKey,
    NwkSKey,
    AppSKey,
    /// Device address
    DevAddr,
    /// Binary uplink, value is `port:confirmed:HEX`
    SendBinary,
    /// Active region band
    Band,
    /// Adaptive data rate
    Adr,
    DataRate,
    /// Firmware and middleware versions
    Version,
    /// Put the modem into low power
    LowPower,
    /// Reboot the modem into its UART bootloader
    DfuReboot,
}

/// Shape of the value carried by a GET response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Completion code only
    None,
    /// Colon-separated hex octets, exactly this many groups
    HexGroups(usize),
    /// Single decimal number
    Number,
    /// Multi-line text block
    TextBlock,
}

impl CommandId {
    /// Wire mnemonic following the `AT` prefix
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Ping => "",
            Self::Reset => "Z",
            Self::Join => "+JOIN",
            Self::JoinStatus => "+NJS",
            Self::DeviceEui => "+DEUI",
            Self::AppEui => "+APPEUI",
            Self::AppKey => "+APPKEY",
            Self::NwkKey => "+NWKKEY",
            Self::NwkSKey => "+NWKSKEY",
            Self::AppSKey => "+APPSKEY",
            Self::DevAddr => "+DADDR",
            Self::SendBinary => "+SEND",
            Self::Band => "+BAND",
            Self::Adr => "+ADR",
            Self::DataRate => "+DR",
            Self::Version => "+VER",
            Self::LowPower => "+CUST_LP",
            Self::DfuReboot => "+CUST_DFU",
        }
    }

    /// Shape of the value returned for the `Get` form
    pub fn response_shape(&self) -> ResponseShape {
        match self {
            Self::DeviceEui | Self::AppEui => ResponseShape::HexGroups(8),
            Self::AppKey | Self::NwkKey | Self::NwkSKey | Self::AppSKey => {
                ResponseShape::HexGroups(16)
            }
            Self::DevAddr => ResponseShape::HexGroups(4),
            Self::JoinStatus | Self::DataRate | Self::Band | Self::Adr => ResponseShape::Number,
            Self::Version => ResponseShape::TextBlock,
            Self::Ping
            | Self::Reset
            | Self::Join
            | Self::SendBinary
            | Self::LowPower
            | Self::DfuReboot => ResponseShape::None,
        }
    }

    /// Whether the modem accepts this form for the command
    pub fn supports(&self, form: CommandForm) -> bool {
        match form {
            CommandForm::Control => matches!(
                self,
                Self::Ping | Self::Reset | Self::LowPower | Self::DfuReboot
            ),
            CommandForm::Get => self.response_shape() != ResponseShape::None,
            CommandForm::Set => matches!(
                self,
                Self::Join
                    | Self::DeviceEui
                    | Self::AppEui
                    | Self::AppKey
                    | Self::NwkKey
                    | Self::NwkSKey
                    | Self::AppSKey
                    | Self::DevAddr
                    | Self::SendBinary
                    | Self::Band
                    | Self::Adr
                    | Self::DataRate
            ),
            CommandForm::Test => self.mnemonic().starts_with('+'),
        }
    }
}

/// Command form, selecting the wire suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandForm {
    Control,
    Set,
    Get,
    Test,
}

impl CommandForm {
    /// Suffix written between the mnemonic and the value
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Control => "",
            Self::Set => "=",
            Self::Get => "=?",
            Self::Test => "?",
        }
    }
}

/// Outcome of a single AT transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    /// Completion token `OK` observed. Payload holds the value lines of a
    /// `Get` transaction, joined by `\n`, and is empty otherwise.
    Ok(Vec<u8, RX_BUFFER_LEN>),
    /// Modem answered with an error token
    Error,
    /// No completion token observed within the response window
    Timeout,
}

impl TransactionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// LoRaWAN regional band, indexed as the modem's `AT+BAND` expects
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    As923 = 0,
    Au915 = 1,
    Cn470 = 2,
    Cn779 = 3,
    Eu433 = 4,
    Eu868 = 5,
    Kr920 = 6,
    In865 = 7,
    Us915 = 8,
    Ru864 = 9,
}

const REGIONS: [(Region, &str); 10] = [
    (Region::As923, "AS923"),
    (Region::Au915, "AU915"),
    (Region::Cn470, "CN470"),
    (Region::Cn779, "CN779"),
    (Region::Eu433, "EU433"),
    (Region::Eu868, "EU868"),
    (Region::Kr920, "KR920"),
    (Region::In865, "IN865"),
    (Region::Us915, "US915"),
    (Region::Ru864, "RU864"),
];

impl Region {
    /// Band index sent with `AT+BAND=`
    pub fn band(&self) -> u8 {
        *self as u8
    }

    /// Try to convert a band index to a region
    pub fn from_band(band: u8) -> Option<Self> {
        REGIONS.get(band as usize).map(|(region, _)| *region)
    }

    /// Look up a region by name, ignoring ASCII case
    pub fn from_name(name: &str) -> Option<Self> {
        REGIONS
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(region, _)| *region)
    }

    pub fn name(&self) -> &'static str {
        REGIONS[*self as usize].1
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::from_band(crate::config::lorawan_defaults::BAND_INDEX).unwrap_or(Self::Eu868)
    }
}

/// Network join procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Over-the-air activation, waits for a join accept
    Otaa,
    /// Activation by personalisation, session keys are provisioned
    Abp,
}

impl JoinMode {
    /// Value written with `AT+JOIN=`
    pub fn wire_value(&self) -> &'static [u8] {
        match self {
            Self::Otaa => b"1",
            Self::Abp => b"0",
        }
    }
}

/// A `major.minor.patch` version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Versions reported by `AT+VER=?`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModemVersions {
    /// Application firmware
    pub app: Version,
    /// Cortex-M4 application core
    pub m4_app: Version,
    /// Cortex-M0+ radio core
    pub m0plus_app: Version,
    /// LoRaWAN middleware
    pub mw_lorawan: Version,
    /// Radio middleware
    pub mw_radio: Version,
}

/// Value decoded from a GET response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    /// No value expected
    None,
    Eui([u8; 8]),
    Key([u8; 16]),
    /// Device address, most significant octet first on the wire
    DevAddr(u32),
    Number(u32),
    Versions(ModemVersions),
}

/// EUI fields held by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EuiKind {
    Device,
    App,
}

impl EuiKind {
    pub fn command(&self) -> CommandId {
        match self {
            Self::Device => CommandId::DeviceEui,
            Self::App => CommandId::AppEui,
        }
    }
}

/// AES-128 keys held by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Application root key (OTAA)
    App,
    /// Network root key (OTAA)
    Nwk,
    /// Network session key (ABP)
    NwkSession,
    /// Application session key (ABP)
    AppSession,
}

impl KeyKind {
    pub fn command(&self) -> CommandId {
        match self {
            Self::App => CommandId::AppKey,
            Self::Nwk => CommandId::NwkKey,
            Self::NwkSession => CommandId::NwkSKey,
            Self::AppSession => CommandId::AppSKey,
        }
    }
}
