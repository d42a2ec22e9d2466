//! Modem driver interface for the device registry
//!
//! Each concrete modem driver implements [`LoraModem`]. The registry keys
//! drivers by instance and function bit, so further modem types can be
//! plugged in without changing the session layer.

use crate::commands::types::{EuiKind, JoinMode, KeyKind, ModemVersions, Region};
use crate::error::ModemError;
use crate::protocol::urc::UrcHandler;
use core::future::Future;

/// Function bits a modem instance can be registered for
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemFunction {
    /// LoRaWAN connectivity
    Lora = 1,
    /// Low-power control
    LowPower = 1 << 1,
}

impl ModemFunction {
    pub fn bit(&self) -> u32 {
        *self as u32
    }
}

/// Set of [`ModemFunction`] bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionMask(u32);

impl FunctionMask {
    pub const NONE: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn with(self, function: ModemFunction) -> Self {
        Self(self.0 | function.bit())
    }

    /// Whether every bit of `other` is set here
    pub fn contains(&self, other: FunctionMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersection(&self, other: FunctionMask) -> FunctionMask {
        Self(self.0 & other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<ModemFunction> for FunctionMask {
    fn from(function: ModemFunction) -> Self {
        Self(function.bit())
    }
}

/// Functions a driver supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub lora: bool,
    pub low_power: bool,
}

impl Capabilities {
    pub fn mask(&self) -> FunctionMask {
        let mut mask = FunctionMask::NONE;
        if self.lora {
            mask = mask.with(ModemFunction::Lora);
        }
        if self.low_power {
            mask = mask.with(ModemFunction::LowPower);
        }
        mask
    }
}

impl From<FunctionMask> for Capabilities {
    fn from(mask: FunctionMask) -> Self {
        Self {
            lora: mask.contains(ModemFunction::Lora.into()),
            low_power: mask.contains(ModemFunction::LowPower.into()),
        }
    }
}

/// Abstract LoRaWAN modem interface
///
/// Every operation that talks to the modem takes the URC handler, since
/// unsolicited events may arrive ahead of or after any command response and
/// are dispatched before the operation returns.
pub trait LoraModem {
    /// Bring up the transport
    fn init(&mut self) -> impl Future<Output = Result<(), ModemError>>;

    /// Release the transport
    fn deinit(&mut self) -> impl Future<Output = Result<(), ModemError>>;

    fn capabilities(&self) -> Capabilities;

    /// Liveness probe
    fn ping(&mut self, urc: &mut dyn UrcHandler) -> impl Future<Output = Result<(), ModemError>>;

    /// Pulse the reset line, harvest boot output and probe
    fn hw_reset(&mut self, urc: &mut dyn UrcHandler)
        -> impl Future<Output = Result<(), ModemError>>;

    /// Soft reset (`ATZ`)
    fn soft_reset(
        &mut self,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    /// Poll the idle line and dispatch pending URCs, returning how many
    fn manage_urcs(
        &mut self,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<usize, ModemError>>;

    /// Hand an uplink to the modem. Success means accepted, not delivered.
    fn send_binary(
        &mut self,
        port: u8,
        confirmed: bool,
        payload: &[u8],
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    fn version(
        &mut self,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<ModemVersions, ModemError>>;

    fn eui(
        &mut self,
        kind: EuiKind,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<[u8; 8], ModemError>>;

    fn set_eui(
        &mut self,
        kind: EuiKind,
        eui: &[u8; 8],
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    fn key(
        &mut self,
        kind: KeyKind,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<[u8; 16], ModemError>>;

    fn set_key(
        &mut self,
        kind: KeyKind,
        key: &[u8; 16],
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    fn dev_addr(
        &mut self,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<u32, ModemError>>;

    fn set_dev_addr(
        &mut self,
        addr: u32,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    fn data_rate(&mut self, urc: &mut dyn UrcHandler)
        -> impl Future<Output = Result<u8, ModemError>>;

    fn set_data_rate(
        &mut self,
        data_rate: u8,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    fn set_adr(
        &mut self,
        enabled: bool,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    fn set_region(
        &mut self,
        region: Region,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    /// Issue a join request. For OTAA the outcome arrives later as a URC.
    fn join(
        &mut self,
        mode: JoinMode,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    /// Query whether the modem reports a joined network
    fn join_status(
        &mut self,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<bool, ModemError>>;

    fn enter_low_power(
        &mut self,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;

    /// Reboot the modem into its UART bootloader
    fn reboot_dfu(
        &mut self,
        urc: &mut dyn UrcHandler,
    ) -> impl Future<Output = Result<(), ModemError>>;
}
