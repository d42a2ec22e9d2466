pub mod device;
pub mod dispatch;
pub mod traits;

pub use device::DeviceRegistry;
pub use dispatch::{ModemReply, ModemRequest};
pub use traits::{Capabilities, FunctionMask, LoraModem, ModemFunction};
