//! Session state, retry accounting and the URC-driven link state

use crate::commands::types::{JoinMode, Region};
use crate::config::{commissioning, lorawan_defaults, session};
use crate::protocol::urc::{Downlink, JoinOutcome, UrcHandler};

/// High-level LoRaWAN session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing known about the modem yet
    NotConfigured,
    /// Reset and region configuration failed, retried on the next tick
    ModemUnresponsive,
    /// Hardware reset and region configuration in progress
    Configuring,
    /// Ready to issue a join request
    JoinTriggered,
    /// OTAA join request accepted, waiting for the join URC
    JoinInProgress,
    /// Network joined, uplinks enabled
    Joined,
}

/// Verdict for a due uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDecision {
    /// Previous uplink acknowledged (or none outstanding)
    Send,
    /// Still waiting for an acknowledgement
    Skip,
    /// Skip limit reached, send without the acknowledgement
    ForceSend,
}

/// Bounded count of uplinks skipped while waiting for an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    skipped: u8,
    limit: u8,
}

impl RetryBudget {
    pub fn new(limit: u8) -> Self {
        Self { skipped: 0, limit }
    }

    pub fn skipped(&self) -> u8 {
        self.skipped
    }

    pub fn limit(&self) -> u8 {
        self.limit
    }

    /// Decide whether a due uplink goes out.
    ///
    /// An observed acknowledgement resets the counter. Without one, up to
    /// `limit` uplinks are skipped, then the next is forced and the counter
    /// starts over.
    pub fn check(&mut self, ack_received: bool) -> SendDecision {
        if ack_received {
            self.skipped = 0;
            return SendDecision::Send;
        }

        if self.skipped < self.limit {
            self.skipped += 1;
            SendDecision::Skip
        } else {
            self.skipped = 0;
            SendDecision::ForceSend
        }
    }

    pub fn reset(&mut self) {
        self.skipped = 0;
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(session::MAX_SKIPPED_SENDS)
    }
}

/// Persistent error counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorTally {
    /// Reset and configuration attempts that left the modem silent
    pub modem_unresponsive: u32,
    /// Uplinks forced out without an acknowledgement
    pub missed_acks: u32,
    /// Uplinks the modem refused
    pub send_failures: u32,
    /// `AT_BUSY_ERROR` events
    pub busy_errors: u32,
}

/// Part of the session driven by unsolicited events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    state: SessionState,
    join_mode: JoinMode,
    /// Acknowledgement seen since the last confirmed uplink
    pub ack_received: bool,
    /// OTAA post-join configuration still to run
    pub config_pending: bool,
    /// Join request issued and not yet resolved
    join_requested: bool,
    transitions: u32,
    pub tally: ErrorTally,
    pub last_downlink: Option<Downlink>,
    pub downlinks: u32,
    pub acks: u32,
    pub join_failures: u32,
}

impl LinkState {
    pub fn new(join_mode: JoinMode) -> Self {
        Self {
            state: SessionState::NotConfigured,
            join_mode,
            ack_received: false,
            config_pending: false,
            join_requested: false,
            transitions: 0,
            tally: ErrorTally::default(),
            last_downlink: None,
            downlinks: 0,
            acks: 0,
            join_failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn join_mode(&self) -> JoinMode {
        self.join_mode
    }

    /// Number of state changes so far
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::info!("Session: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.transitions += 1;
        }
    }

    /// Forget the current join, leaving the state unchanged
    pub fn clear_join(&mut self) {
        self.ack_received = false;
        self.config_pending = false;
        self.join_requested = false;
    }

    /// Prepare for a new join request
    pub fn begin_join(&mut self, mode: JoinMode) {
        self.clear_join();
        self.join_mode = mode;
        self.join_requested = true;
    }

    /// Whether a join accept would be taken now
    pub fn join_requested(&self) -> bool {
        self.join_requested
    }

    /// Enter Joined without waiting for a join accept
    pub fn complete_join(&mut self) {
        self.join_requested = false;
        self.set_state(SessionState::Joined);
    }
}

impl UrcHandler for LinkState {
    fn on_joined(&mut self, outcome: JoinOutcome) {
        match outcome {
            JoinOutcome::Accepted if self.join_requested => {
                self.complete_join();
                if self.join_mode == JoinMode::Otaa {
                    self.config_pending = true;
                }
            }
            JoinOutcome::Accepted => {
                log::debug!("Join accept ignored in {:?}", self.state);
            }
            JoinOutcome::Failed | JoinOutcome::NoNetwork => {
                if self.join_requested || self.state == SessionState::Joined {
                    self.join_failures += 1;
                    self.clear_join();
                    self.set_state(SessionState::JoinTriggered);
                }
            }
        }
    }

    fn on_send_confirmed(&mut self) {
        self.ack_received = true;
        self.acks += 1;
    }

    fn on_busy_error(&mut self) {
        self.tally.busy_errors += 1;
        log::warn!("Radio busy ({} total)", self.tally.busy_errors);
    }

    fn on_downlink(&mut self, downlink: &Downlink) {
        self.downlinks += 1;
        self.last_downlink = Some(downlink.clone());
    }
}

/// Session behaviour settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub region: Region,
    pub join_mode: JoinMode,
    pub adr: bool,
    /// Data rate applied after join when ADR is off
    pub data_rate: u8,
    /// Request network acknowledgement for uplinks
    pub confirmed: bool,
    pub app_port: u8,
    /// Uplink every N joined ticks
    pub send_every_ticks: u32,
    /// Ticks to wait for a join accept
    pub join_timeout_ticks: u32,
    /// Uplinks skipped while an acknowledgement is outstanding
    pub max_skipped_sends: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            join_mode: if lorawan_defaults::USE_OTAA {
                JoinMode::Otaa
            } else {
                JoinMode::Abp
            },
            adr: lorawan_defaults::ADR_ENABLED,
            data_rate: lorawan_defaults::DATA_RATE,
            confirmed: lorawan_defaults::CONFIRMED_UPLINKS,
            app_port: lorawan_defaults::APP_PORT,
            send_every_ticks: session::SEND_EVERY_TICKS,
            join_timeout_ticks: session::JOIN_TIMEOUT_TICKS,
            max_skipped_sends: session::MAX_SKIPPED_SENDS,
        }
    }
}

/// LoRaWAN credentials written before a join. `None` keeps the modem's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub app_eui: Option<[u8; 8]>,
    pub app_key: Option<[u8; 16]>,
    pub nwk_key: Option<[u8; 16]>,
    pub dev_addr: Option<u32>,
    pub nwk_s_key: Option<[u8; 16]>,
    pub app_s_key: Option<[u8; 16]>,
}

impl Credentials {
    /// Keep everything already stored in the modem
    pub const fn none() -> Self {
        Self {
            app_eui: None,
            app_key: None,
            nwk_key: None,
            dev_addr: None,
            nwk_s_key: None,
            app_s_key: None,
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            app_eui: Some(commissioning::APP_EUI),
            app_key: Some(commissioning::APP_KEY),
            nwk_key: Some(commissioning::NWK_KEY),
            dev_addr: Some(commissioning::DEV_ADDR),
            nwk_s_key: Some(commissioning::NWK_S_KEY),
            app_s_key: Some(commissioning::APP_S_KEY),
        }
    }
}
