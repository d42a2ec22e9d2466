//! Device registry
//!
//! Maps an instance index and function bit to a registered modem driver.
//! Every lookup is validated before any I/O is attempted.

use crate::error::ModemError;
use crate::registry::traits::{Capabilities, FunctionMask, LoraModem, ModemFunction};

struct Slot<M> {
    driver: M,
    enabled: FunctionMask,
}

/// Fixed-capacity table of modem drivers
pub struct DeviceRegistry<M: LoraModem, const N: usize> {
    slots: [Option<Slot<M>>; N],
}

impl<M: LoraModem, const N: usize> DeviceRegistry<M, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Number of instance slots
    pub fn capacity(&self) -> usize {
        N
    }

    /// Initialise `driver` and enable the requested functions it supports.
    ///
    /// Returns the enabled subset. An empty intersection is rejected and
    /// the driver is released again.
    pub async fn probe(driver: &mut M, requested: FunctionMask) -> Result<Capabilities, ModemError> {
        driver.init().await?;

        let enabled = requested.intersection(driver.capabilities().mask());
        if enabled.is_empty() {
            log::warn!(
                "Probe: none of the requested functions {:#x} supported",
                requested.bits()
            );
            driver.deinit().await?;
            return Err(ModemError::InvalidParam);
        }

        Ok(Capabilities::from(enabled))
    }

    /// Probe `driver` and store it under `instance`
    pub async fn register(
        &mut self,
        instance: usize,
        mut driver: M,
        requested: FunctionMask,
    ) -> Result<Capabilities, ModemError> {
        match self.slots.get(instance) {
            Some(None) => {}
            Some(Some(_)) => {
                log::warn!("Instance {} already registered", instance);
                return Err(ModemError::InvalidParam);
            }
            None => return Err(ModemError::InvalidParam),
        }

        let enabled = Self::probe(&mut driver, requested).await?;
        self.slots[instance] = Some(Slot {
            driver,
            enabled: enabled.mask(),
        });

        log::info!(
            "Registered modem instance {} (functions {:#x})",
            instance,
            enabled.mask().bits()
        );
        Ok(enabled)
    }

    /// Release and remove the driver at `instance`
    pub async fn deregister(&mut self, instance: usize) -> Result<M, ModemError> {
        let mut slot = self
            .slots
            .get_mut(instance)
            .and_then(Option::take)
            .ok_or(ModemError::InvalidParam)?;

        slot.driver.deinit().await?;
        log::info!("Deregistered modem instance {}", instance);
        Ok(slot.driver)
    }

    /// Functions enabled for `instance`
    pub fn enabled(&self, instance: usize) -> Option<FunctionMask> {
        self.slots.get(instance)?.as_ref().map(|slot| slot.enabled)
    }

    /// Look up the driver for `instance`, requiring `function` to be enabled
    pub fn modem(&mut self, instance: usize, function: ModemFunction) -> Result<&mut M, ModemError> {
        self.modem_for(instance, function.into())
    }

    /// Look up the driver for `instance`, requiring every bit of `functions`
    pub fn modem_for(
        &mut self,
        instance: usize,
        functions: FunctionMask,
    ) -> Result<&mut M, ModemError> {
        let slot = self
            .slots
            .get_mut(instance)
            .and_then(Option::as_mut)
            .ok_or(ModemError::InvalidParam)?;

        if functions.is_empty() || !slot.enabled.contains(functions) {
            log::warn!(
                "Instance {}: functions {:#x} not enabled",
                instance,
                functions.bits()
            );
            return Err(ModemError::InvalidParam);
        }

        Ok(&mut slot.driver)
    }
}

impl<M: LoraModem, const N: usize> Default for DeviceRegistry<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
