//! Request dispatch through the device registry
//!
//! A [`ModemRequest`] names one modem operation and its arguments. The
//! registry resolves the instance, checks the function bit and runs the
//! operation, returning a [`ModemReply`].

use crate::commands::types::{EuiKind, JoinMode, KeyKind, ModemVersions, Region};
use crate::config::payload::MAX_LORA_PAYLOAD;
use crate::error::ModemError;
use crate::protocol::urc::UrcHandler;
use crate::registry::device::DeviceRegistry;
use crate::registry::traits::{LoraModem, ModemFunction};
use heapless::Vec;

/// Modem operation with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemRequest {
    Ping,
    HwReset,
    SoftReset,
    ManageUrcs,
    SendBinary {
        port: u8,
        confirmed: bool,
        payload: Vec<u8, MAX_LORA_PAYLOAD>,
    },
    Version,
    Eui(EuiKind),
    SetEui(EuiKind, [u8; 8]),
    Key(KeyKind),
    SetKey(KeyKind, [u8; 16]),
    DevAddr,
    SetDevAddr(u32),
    DataRate,
    SetDataRate(u8),
    SetAdr(bool),
    SetRegion(Region),
    Join(JoinMode),
    JoinStatus,
    EnterLowPower,
    RebootDfu,
}

impl ModemRequest {
    /// Function bit the request belongs to
    pub fn function(&self) -> ModemFunction {
        match self {
            Self::EnterLowPower => ModemFunction::LowPower,
            _ => ModemFunction::Lora,
        }
    }
}

/// Result of a dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemReply {
    /// Operation completed with no value
    Done,
    /// URCs harvested
    UrcCount(usize),
    Versions(ModemVersions),
    Eui([u8; 8]),
    Key([u8; 16]),
    DevAddr(u32),
    DataRate(u8),
    JoinStatus(bool),
}

impl<M: LoraModem, const N: usize> DeviceRegistry<M, N> {
    /// Run `request` on the driver at `instance`.
    ///
    /// `function` must be enabled for the instance and must match the
    /// request, otherwise the call fails with `InvalidParam` before any I/O.
    pub async fn dispatch(
        &mut self,
        instance: usize,
        function: ModemFunction,
        request: ModemRequest,
        urc: &mut dyn UrcHandler,
    ) -> Result<ModemReply, ModemError> {
        if request.function() != function {
            log::warn!("{:?} is not a {:?} operation", request, function);
            return Err(ModemError::InvalidParam);
        }

        let modem = self.modem(instance, function)?;

        let reply = match request {
            ModemRequest::Ping => modem.ping(urc).await.map(|_| ModemReply::Done)?,
            ModemRequest::HwReset => modem.hw_reset(urc).await.map(|_| ModemReply::Done)?,
            ModemRequest::SoftReset => modem.soft_reset(urc).await.map(|_| ModemReply::Done)?,
            ModemRequest::ManageUrcs => ModemReply::UrcCount(modem.manage_urcs(urc).await?),
            ModemRequest::SendBinary {
                port,
                confirmed,
                payload,
            } => {
                modem.send_binary(port, confirmed, &payload, urc).await?;
                ModemReply::Done
            }
            ModemRequest::Version => ModemReply::Versions(modem.version(urc).await?),
            ModemRequest::Eui(kind) => ModemReply::Eui(modem.eui(kind, urc).await?),
            ModemRequest::SetEui(kind, eui) => {
                modem.set_eui(kind, &eui, urc).await?;
                ModemReply::Done
            }
            ModemRequest::Key(kind) => ModemReply::Key(modem.key(kind, urc).await?),
            ModemRequest::SetKey(kind, key) => {
                modem.set_key(kind, &key, urc).await?;
                ModemReply::Done
            }
            ModemRequest::DevAddr => ModemReply::DevAddr(modem.dev_addr(urc).await?),
            ModemRequest::SetDevAddr(addr) => {
                modem.set_dev_addr(addr, urc).await?;
                ModemReply::Done
            }
            ModemRequest::DataRate => ModemReply::DataRate(modem.data_rate(urc).await?),
            ModemRequest::SetDataRate(dr) => {
                modem.set_data_rate(dr, urc).await?;
                ModemReply::Done
            }
            ModemRequest::SetAdr(enabled) => {
                modem.set_adr(enabled, urc).await?;
                ModemReply::Done
            }
            ModemRequest::SetRegion(region) => {
                modem.set_region(region, urc).await?;
                ModemReply::Done
            }
            ModemRequest::Join(mode) => {
                modem.join(mode, urc).await?;
                ModemReply::Done
            }
            ModemRequest::JoinStatus => ModemReply::JoinStatus(modem.join_status(urc).await?),
            ModemRequest::EnterLowPower => {
                modem.enter_low_power(urc).await?;
                ModemReply::Done
            }
            ModemRequest::RebootDfu => {
                modem.reboot_dfu(urc).await?;
                ModemReply::Done
            }
        };

        Ok(reply)
    }
}
