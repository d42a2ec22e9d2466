//! Embassy tasks module

pub mod modem;

pub use modem::{
    modem_task, SessionCommand, SessionCommandReceiver, SnapshotReceiver, SnapshotSender,
    SESSION_CHANNEL, SNAPSHOT_CHANNEL,
};
