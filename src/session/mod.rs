pub mod machine;
pub mod state;

pub use machine::{Session, TickOutcome};
pub use state::{
    Credentials, ErrorTally, LinkState, RetryBudget, SendDecision, SessionConfig, SessionState,
};
