//! Session task
//!
//! Owns the LoRaWAN [`Session`] and ticks it at a fixed interval. Sensor
//! snapshots and control requests arrive over channels so the producers
//! never touch the modem.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::{Duration, Timer};

use crate::commands::types::Region;
use crate::config::session::TICK_INTERVAL_MS;
use crate::payload::lpp::SensorSnapshot;
use crate::registry::traits::LoraModem;
use crate::session::{Credentials, Session, TickOutcome};

/// Requests from other tasks
#[derive(Clone, Copy, Debug)]
pub enum SessionCommand {
    /// Park or resume the session
    Enable(bool),
    SetRegion(Region),
    SetCredentials(Credentials),
    /// Put the modem into low-power mode and park the session
    LowPower,
}

/// Channel for the latest sensor readings
pub static SNAPSHOT_CHANNEL: Channel<CriticalSectionRawMutex, SensorSnapshot, 2> = Channel::new();

/// Channel for session control
pub static SESSION_CHANNEL: Channel<CriticalSectionRawMutex, SessionCommand, 4> = Channel::new();

pub type SnapshotSender = Sender<'static, CriticalSectionRawMutex, SensorSnapshot, 2>;
pub type SnapshotReceiver = Receiver<'static, CriticalSectionRawMutex, SensorSnapshot, 2>;
pub type SessionCommandReceiver = Receiver<'static, CriticalSectionRawMutex, SessionCommand, 4>;

/// Tick the session forever
pub async fn modem_task<M: LoraModem, const N: usize>(
    mut session: Session<M, N>,
    snapshots: SnapshotReceiver,
    commands: SessionCommandReceiver,
) {
    let mut snapshot = SensorSnapshot::default();

    match session.modem_versions().await {
        Ok(versions) => log::info!(
            "Modem firmware {}.{}.{}",
            versions.app.major,
            versions.app.minor,
            versions.app.patch
        ),
        Err(e) => log::warn!("Modem version query failed: {}", e),
    }

    loop {
        while let Ok(command) = commands.try_receive() {
            apply_command(&mut session, command).await;
        }

        // Only the newest readings matter
        while let Ok(latest) = snapshots.try_receive() {
            snapshot = latest;
        }

        match session.tick(&mut snapshot).await {
            TickOutcome::Idle | TickOutcome::AwaitingJoin | TickOutcome::Disabled => {}
            outcome => log::info!("Session: {:?}", outcome),
        }

        Timer::after(Duration::from_millis(TICK_INTERVAL_MS)).await;
    }
}

async fn apply_command<M: LoraModem, const N: usize>(
    session: &mut Session<M, N>,
    command: SessionCommand,
) {
    match command {
        SessionCommand::Enable(enabled) => session.set_enabled(enabled),
        SessionCommand::SetRegion(region) => session.set_region(region),
        SessionCommand::SetCredentials(credentials) => session.set_credentials(credentials),
        SessionCommand::LowPower => {
            if let Err(e) = session.enter_low_power().await {
                log::warn!("Low power request failed: {}", e);
            }
            session.set_enabled(false);
        }
    }
}
