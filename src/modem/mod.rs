pub mod driver;
pub mod reader;
pub mod traits;
#[cfg(feature = "embedded")]
pub mod uart;

pub use driver::{AtModem, ModemSettings, ModemTimings};
pub use reader::{PollReport, PollWindow, QuiescencePolicy, QuiescenceReader, RxBuffer};
pub use traits::{ModemTransport, TransportError};
#[cfg(feature = "embedded")]
pub use uart::UartTransport;
