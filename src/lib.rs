#![cfg_attr(not(test), no_std)]

pub mod commands;
pub mod config;
pub mod error;
pub mod modem;
pub mod payload;
pub mod protocol;
pub mod registry;
pub mod session;

// Tasks depend on embassy/esp-hal, only available with the embedded feature
#[cfg(feature = "embedded")]
pub mod tasks;

pub use error::ModemError;
