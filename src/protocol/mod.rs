pub mod lines;
pub mod urc;

pub use lines::LineTokenizer;
pub use urc::{
    classify, dispatch, Classified, CompletionCode, Downlink, JoinOutcome, UrcHandler, UrcKind,
};
