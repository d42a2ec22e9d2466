pub mod parser;
pub mod serialiser;
pub mod types;

pub use parser::CommandParser;
pub use serialiser::{CommandLine, CommandSerialiser};
pub use types::{
    CommandForm, CommandId, DecodedValue, EuiKind, JoinMode, KeyKind, ModemVersions, Region,
    ResponseShape, TransactionResult, Version,
};
