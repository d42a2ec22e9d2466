pub mod lpp;

pub use lpp::{GpsFix, LppWriter, SensorSnapshot, UplinkBuffer, UplinkSource};
