//! LoRaWAN session state machine
//!
//! The outer scheduler calls [`Session::tick`] periodically. Each tick runs
//! to completion: it executes the AT transactions the current state needs,
//! one at a time, and reports what happened as a [`TickOutcome`].
//!
//! ```text
//! NotConfigured --probe ok--------------------------> (join)
//! NotConfigured --probe fails--> Configuring --region ok--> JoinTriggered
//! JoinTriggered --OTAA request ok--> JoinInProgress --JOINED--> Joined
//! JoinTriggered --ABP request ok--> Joined
//! JoinInProgress --JOIN FAILED / timeout--> JoinTriggered
//! JoinTriggered --probe fails--> Configuring
//! JoinTriggered --request times out--> Configuring
//! Joined --probe fails twice--> Configuring
//! ```

use crate::commands::types::{EuiKind, JoinMode, KeyKind, ModemVersions, Region};
use crate::error::ModemError;
use crate::payload::lpp::{UplinkBuffer, UplinkSource};
use crate::registry::device::DeviceRegistry;
use crate::registry::traits::{LoraModem, ModemFunction};
use crate::session::state::{
    Credentials, ErrorTally, LinkState, RetryBudget, SendDecision, SessionConfig, SessionState,
};

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session parked with `set_enabled(false)`
    Disabled,
    /// Reset and region configuration did not bring the modem back
    Unresponsive,
    /// OTAA join request accepted by the modem
    JoinRequested,
    /// Join request refused, failed or timed out
    JoinFailed,
    /// Network joined during this tick
    Joined,
    /// Still waiting for a join accept
    AwaitingJoin,
    /// Uplink skipped while an acknowledgement is outstanding
    Skipped,
    /// Uplink accepted by the modem
    Sent,
    /// Uplink refused by the modem
    SendFailed,
    /// Joined link dropped, a new join follows
    LinkLost,
    /// Joined, no uplink due
    Idle,
}

/// Session driving join and uplinks through a registered modem
pub struct Session<M: LoraModem, const N: usize> {
    registry: DeviceRegistry<M, N>,
    instance: usize,
    config: SessionConfig,
    credentials: Credentials,
    link: LinkState,
    budget: RetryBudget,
    enabled: bool,
    /// Ticks spent waiting for the current join accept
    join_ticks: u32,
    /// Joined ticks since the last uplink slot
    send_ticks: u32,
    /// Last data rate reported by the modem
    data_rate: u8,
}

impl<M: LoraModem, const N: usize> Session<M, N> {
    pub fn new(
        registry: DeviceRegistry<M, N>,
        instance: usize,
        config: SessionConfig,
        credentials: Credentials,
    ) -> Self {
        Self {
            registry,
            instance,
            config,
            credentials,
            link: LinkState::new(config.join_mode),
            budget: RetryBudget::new(config.max_skipped_sends),
            enabled: true,
            join_ticks: 0,
            send_ticks: 0,
            data_rate: config.data_rate,
        }
    }

    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    pub fn link(&self) -> &LinkState {
        &self.link
    }

    pub fn tally(&self) -> ErrorTally {
        self.link.tally
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn data_rate(&self) -> u8 {
        self.data_rate
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry<M, N> {
        &mut self.registry
    }

    /// Run one scheduler invocation
    pub async fn tick<S: UplinkSource>(&mut self, source: &mut S) -> TickOutcome {
        if !self.enabled {
            return TickOutcome::Disabled;
        }

        let outcome = match self.link.state() {
            SessionState::NotConfigured => self.start().await,
            SessionState::ModemUnresponsive | SessionState::Configuring => self.configure().await,
            SessionState::JoinTriggered => self.trigger_join().await,
            SessionState::JoinInProgress => self.await_join().await,
            SessionState::Joined => self.joined_tick(source).await,
        };

        if self.link.config_pending {
            self.apply_join_config().await;
        }

        log::debug!("Tick: {:?}, now {:?}", outcome, self.link.state());
        outcome
    }

    /// Park or resume the session. Parking drops any join.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        log::info!("Session {}", if enabled { "enabled" } else { "disabled" });
        self.enabled = enabled;
        self.link.clear_join();
        self.link.set_state(SessionState::NotConfigured);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replace the credentials, forcing a new join with them
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        if matches!(
            self.link.state(),
            SessionState::JoinInProgress | SessionState::Joined
        ) {
            self.link.clear_join();
            self.link.set_state(SessionState::JoinTriggered);
        }
    }

    /// Change region, forcing a modem reconfiguration and new join
    pub fn set_region(&mut self, region: Region) {
        self.config.region = region;
        self.link.clear_join();
        self.link.set_state(SessionState::Configuring);
    }

    pub async fn enter_low_power(&mut self) -> Result<(), ModemError> {
        let modem = self.registry.modem(self.instance, ModemFunction::LowPower)?;
        modem.enter_low_power(&mut self.link).await
    }

    pub async fn modem_versions(&mut self) -> Result<ModemVersions, ModemError> {
        let modem = self.registry.modem(self.instance, ModemFunction::Lora)?;
        modem.version(&mut self.link).await
    }

    async fn probe(&mut self) -> bool {
        match self.registry.modem(self.instance, ModemFunction::Lora) {
            Ok(modem) => modem.ping(&mut self.link).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn harvest(&mut self) -> Result<usize, ModemError> {
        let modem = self.registry.modem(self.instance, ModemFunction::Lora)?;
        modem.manage_urcs(&mut self.link).await
    }

    async fn start(&mut self) -> TickOutcome {
        if self.probe().await {
            log::info!("Modem responding, joining");
            self.request_join().await
        } else {
            log::warn!("Modem not responding, reconfiguring");
            self.configure().await
        }
    }

    async fn configure(&mut self) -> TickOutcome {
        self.link.clear_join();
        self.link.set_state(SessionState::Configuring);

        match self.reset_and_configure().await {
            Ok(()) => {
                self.link.set_state(SessionState::JoinTriggered);
                self.request_join().await
            }
            Err(e) => {
                self.link.tally.modem_unresponsive += 1;
                log::error!(
                    "Modem unresponsive: {} ({} total)",
                    e,
                    self.link.tally.modem_unresponsive
                );
                self.link.set_state(SessionState::ModemUnresponsive);
                TickOutcome::Unresponsive
            }
        }
    }

    async fn reset_and_configure(&mut self) -> Result<(), ModemError> {
        let region = self.config.region;
        let modem = self.registry.modem(self.instance, ModemFunction::Lora)?;

        if let Err(e) = modem.hw_reset(&mut self.link).await {
            log::warn!("Modem reset: {}", e);
        }
        modem.set_region(region, &mut self.link).await?;
        modem.ping(&mut self.link).await
    }

    async fn trigger_join(&mut self) -> TickOutcome {
        if !self.probe().await {
            log::warn!("Modem not responding before join, reconfiguring");
            return self.configure().await;
        }
        self.request_join().await
    }

    /// Write credentials and issue the join. Expects a responding modem.
    async fn request_join(&mut self) -> TickOutcome {
        let mode = self.config.join_mode;
        self.link.begin_join(mode);
        self.join_ticks = 0;
        self.send_ticks = 0;
        self.budget.reset();

        let result = match mode {
            JoinMode::Otaa => self.join_otaa().await,
            JoinMode::Abp => self.join_abp().await,
        };

        result.unwrap_or_else(|e| {
            log::warn!("Join request failed: {}", e);
            self.link.clear_join();
            match e {
                // The modem stopped answering, reset it on the next tick
                ModemError::Timeout | ModemError::Transport(_) => {
                    self.link.set_state(SessionState::Configuring)
                }
                _ => self.link.set_state(SessionState::JoinTriggered),
            }
            TickOutcome::JoinFailed
        })
    }

    async fn join_otaa(&mut self) -> Result<TickOutcome, ModemError> {
        let credentials = self.credentials;
        let modem = self.registry.modem(self.instance, ModemFunction::Lora)?;
        let link = &mut self.link;

        if let Some(eui) = credentials.app_eui {
            modem.set_eui(EuiKind::App, &eui, link).await?;
        }
        if let Some(key) = credentials.app_key {
            modem.set_key(KeyKind::App, &key, link).await?;
        }
        if let Some(key) = credentials.nwk_key {
            modem.set_key(KeyKind::Nwk, &key, link).await?;
        }

        modem.join(JoinMode::Otaa, link).await?;

        // The accept may already have arrived with the response
        if link.state() == SessionState::Joined {
            return Ok(TickOutcome::Joined);
        }
        link.set_state(SessionState::JoinInProgress);
        Ok(TickOutcome::JoinRequested)
    }

    async fn join_abp(&mut self) -> Result<TickOutcome, ModemError> {
        let credentials = self.credentials;
        let config = self.config;
        let modem = self.registry.modem(self.instance, ModemFunction::Lora)?;
        let link = &mut self.link;

        if let Some(eui) = credentials.app_eui {
            modem.set_eui(EuiKind::App, &eui, link).await?;
        }
        if let Some(key) = credentials.app_key {
            modem.set_key(KeyKind::App, &key, link).await?;
        }
        if let Some(key) = credentials.nwk_key {
            modem.set_key(KeyKind::Nwk, &key, link).await?;
        }
        if let Some(addr) = credentials.dev_addr {
            modem.set_dev_addr(addr, link).await?;
        }
        if let Some(key) = credentials.nwk_s_key {
            modem.set_key(KeyKind::NwkSession, &key, link).await?;
        }
        if let Some(key) = credentials.app_s_key {
            modem.set_key(KeyKind::AppSession, &key, link).await?;
        }

        modem.join(JoinMode::Abp, link).await?;
        link.complete_join();
        link.ack_received = true;

        if let Err(e) = modem.set_adr(config.adr, link).await {
            log::warn!("ADR setup: {}", e);
        }
        match modem.set_data_rate(config.data_rate, link).await {
            Ok(()) => self.data_rate = config.data_rate,
            Err(e) => log::warn!("Data rate setup: {}", e),
        }

        Ok(TickOutcome::Joined)
    }

    /// OTAA configuration after the join accept
    async fn apply_join_config(&mut self) {
        self.link.config_pending = false;
        if self.link.state() != SessionState::Joined {
            return;
        }
        self.link.ack_received = true;

        let config = self.config;
        let modem = match self.registry.modem(self.instance, ModemFunction::Lora) {
            Ok(modem) => modem,
            Err(_) => return,
        };

        if let Err(e) = modem.set_adr(config.adr, &mut self.link).await {
            log::warn!("ADR setup: {}", e);
        }
        // ADR owns the data rate when enabled
        if !config.adr {
            match modem.set_data_rate(config.data_rate, &mut self.link).await {
                Ok(()) => self.data_rate = config.data_rate,
                Err(e) => log::warn!("Data rate setup: {}", e),
            }
        }
    }

    async fn await_join(&mut self) -> TickOutcome {
        self.join_ticks += 1;
        if let Err(e) = self.harvest().await {
            log::warn!("URC poll: {}, reconfiguring", e);
            self.link.clear_join();
            self.link.set_state(SessionState::Configuring);
            return TickOutcome::JoinFailed;
        }

        match self.link.state() {
            SessionState::Joined => return TickOutcome::Joined,
            SessionState::JoinInProgress => {}
            _ => return TickOutcome::JoinFailed,
        }

        if self.join_ticks >= self.config.join_timeout_ticks {
            log::warn!("No join accept after {} ticks, retrying", self.join_ticks);
            self.link.clear_join();
            self.link.set_state(SessionState::JoinTriggered);
            return TickOutcome::JoinFailed;
        }

        TickOutcome::AwaitingJoin
    }

    async fn joined_tick<S: UplinkSource>(&mut self, source: &mut S) -> TickOutcome {
        if let Err(e) = self.harvest().await {
            log::warn!("URC poll: {}", e);
        }
        if self.link.state() != SessionState::Joined {
            return TickOutcome::LinkLost;
        }
        if self.link.ack_received {
            self.budget.reset();
        }

        let due = self.send_ticks == 0;
        self.send_ticks = (self.send_ticks + 1) % self.config.send_every_ticks.max(1);
        if !due {
            return TickOutcome::Idle;
        }

        if self.config.confirmed {
            match self.budget.check(self.link.ack_received) {
                SendDecision::Send => {}
                SendDecision::Skip => {
                    log::info!(
                        "No ack for previous uplink, skipping ({}/{})",
                        self.budget.skipped(),
                        self.budget.limit()
                    );
                    return TickOutcome::Skipped;
                }
                SendDecision::ForceSend => {
                    self.link.tally.missed_acks += 1;
                    log::warn!(
                        "No ack after {} skipped uplinks ({} missed)",
                        self.budget.limit(),
                        self.link.tally.missed_acks
                    );
                }
            }
        }
        self.link.ack_received = false;

        self.send_uplink(source).await
    }

    async fn send_uplink<S: UplinkSource>(&mut self, source: &mut S) -> TickOutcome {
        let config = self.config;
        let modem = match self.registry.modem(self.instance, ModemFunction::Lora) {
            Ok(modem) => modem,
            Err(e) => {
                log::warn!("Uplink: {}", e);
                return TickOutcome::SendFailed;
            }
        };

        match modem.data_rate(&mut self.link).await {
            Ok(data_rate) => self.data_rate = data_rate,
            Err(e) => log::warn!("Data rate query: {}", e),
        }

        let mut payload = UplinkBuffer::new();
        if let Err(e) = source.fill_uplink(self.data_rate, &mut payload) {
            self.link.tally.send_failures += 1;
            log::warn!("Uplink payload: {}", e);
            return TickOutcome::SendFailed;
        }

        if modem.ping(&mut self.link).await.is_err() && modem.ping(&mut self.link).await.is_err() {
            log::error!("Modem stopped responding, dropping join");
            self.link.clear_join();
            self.link.set_state(SessionState::Configuring);
            return TickOutcome::LinkLost;
        }

        match modem
            .send_binary(config.app_port, config.confirmed, &payload, &mut self.link)
            .await
        {
            Ok(()) => TickOutcome::Sent,
            Err(e) => {
                self.link.tally.send_failures += 1;
                log::warn!(
                    "Uplink refused: {} ({} failures)",
                    e,
                    self.link.tally.send_failures
                );
                TickOutcome::SendFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::driver::AtModem;
    use crate::modem::traits::mock::MockTransport;
    use crate::payload::lpp::SensorSnapshot;
    use crate::registry::traits::FunctionMask;
    use futures::executor::block_on;

    type TestSession = Session<AtModem<MockTransport>, 1>;

    fn test_config() -> SessionConfig {
        SessionConfig {
            send_every_ticks: 1,
            ..SessionConfig::default()
        }
    }

    fn session_with(config: SessionConfig, transport: MockTransport) -> TestSession {
        let mut registry = DeviceRegistry::new();
        let functions = FunctionMask::NONE
            .with(ModemFunction::Lora)
            .with(ModemFunction::LowPower);
        block_on(registry.register(0, AtModem::new(transport), functions)).unwrap();
        Session::new(registry, 0, config, Credentials::default())
    }

    /// Modem that accepts every command
    fn healthy_modem() -> MockTransport {
        let transport = MockTransport::new();
        transport.respond("AT", b"\r\nOK\r\n");
        transport.respond("AT+DR=?", b"\r\n4\r\n\r\nOK\r\n");
        transport
    }

    fn transport(session: &mut TestSession) -> &MockTransport {
        session
            .registry_mut()
            .modem(0, ModemFunction::Lora)
            .unwrap()
            .transport()
    }

    fn commands(session: &mut TestSession) -> Vec<String> {
        transport(session).commands()
    }

    fn tick(session: &mut TestSession) -> TickOutcome {
        block_on(session.tick(&mut SensorSnapshot::default()))
    }

    fn join_and_keep_commands(session: &mut TestSession) {
        assert_eq!(tick(session), TickOutcome::JoinRequested);
        transport(session).queue_rx_data(b"\r\n+EVT:JOINED\r\n");
        assert_eq!(tick(session), TickOutcome::Joined);
    }

    fn join(session: &mut TestSession) {
        join_and_keep_commands(session);
        transport(session).clear_commands();
    }

    #[test]
    fn test_otaa_joins_in_two_transitions() {
        let mut session = session_with(test_config(), healthy_modem());

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        assert_eq!(session.state(), SessionState::JoinInProgress);
        assert_eq!(session.link().transitions(), 1);
        assert_eq!(
            commands(&mut session),
            vec![
                "AT".to_string(),
                "AT+APPEUI=01:01:01:01:01:01:01:01".to_string(),
                "AT+APPKEY=2B:7E:15:16:28:AE:D2:A6:AB:F7:15:88:09:CF:4F:3C".to_string(),
                "AT+NWKKEY=2B:7E:15:16:28:AE:D2:A6:AB:F7:15:88:09:CF:4F:3C".to_string(),
                "AT+JOIN=1".to_string(),
            ]
        );

        transport(&mut session).clear_commands();
        transport(&mut session).queue_rx_data(b"\r\n+EVT:JOINED\r\n");

        assert_eq!(tick(&mut session), TickOutcome::Joined);
        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(session.link().transitions(), 2);

        // Post-join configuration with ADR off sets the data rate
        let sent = commands(&mut session);
        assert!(sent.contains(&"AT+ADR=0".to_string()));
        assert!(sent.contains(&"AT+DR=4".to_string()));
        assert!(session.link().ack_received);
        assert!(!session.link().config_pending);
    }

    #[test]
    fn test_otaa_with_adr_leaves_data_rate() {
        let config = SessionConfig {
            adr: true,
            ..test_config()
        };
        let mut session = session_with(config, healthy_modem());
        join_and_keep_commands(&mut session);

        let sent = commands(&mut session);
        assert!(sent.contains(&"AT+ADR=1".to_string()));
        assert!(!sent.iter().any(|c| c.starts_with("AT+DR=") && c != "AT+DR=?"));
    }

    #[test]
    fn test_join_failure_returns_to_join_triggered() {
        let mut session = session_with(test_config(), healthy_modem());

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        transport(&mut session).queue_rx_data(b"\r\n+EVT:JOIN FAILED\r\n");

        assert_eq!(tick(&mut session), TickOutcome::JoinFailed);
        assert_eq!(session.state(), SessionState::JoinTriggered);
        assert_eq!(session.link().join_failures, 1);

        // Next tick retries from the join request, not from configuration
        transport(&mut session).clear_commands();
        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        assert_eq!(commands(&mut session).last().map(String::as_str), Some("AT+JOIN=1"));
        assert!(transport(&mut session).reset_levels().is_empty());
    }

    #[test]
    fn test_join_request_refused() {
        let modem = healthy_modem();
        modem.respond("AT+JOIN", b"\r\nAT_ERROR\r\n");
        let mut session = session_with(test_config(), modem);

        assert_eq!(tick(&mut session), TickOutcome::JoinFailed);
        assert_eq!(session.state(), SessionState::JoinTriggered);
    }

    #[test]
    fn test_silent_modem_reset_before_join_retry() {
        let mut session = session_with(test_config(), healthy_modem());

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        transport(&mut session).queue_rx_data(b"\r\n+EVT:JOIN FAILED\r\n");
        assert_eq!(tick(&mut session), TickOutcome::JoinFailed);
        assert_eq!(session.state(), SessionState::JoinTriggered);

        // Modem hangs after the failed join
        transport(&mut session).respond("AT", b"");
        transport(&mut session).clear_commands();

        assert_eq!(tick(&mut session), TickOutcome::Unresponsive);
        assert_eq!(session.state(), SessionState::ModemUnresponsive);
        assert_eq!(session.tally().modem_unresponsive, 1);
        assert_eq!(transport(&mut session).reset_levels(), vec![false, true]);
        assert!(!commands(&mut session).iter().any(|c| c.starts_with("AT+APPEUI")));
    }

    #[test]
    fn test_join_request_timeout_resets_modem() {
        let modem = healthy_modem();
        modem.respond("AT+JOIN", b"");
        let mut session = session_with(test_config(), modem);

        assert_eq!(tick(&mut session), TickOutcome::JoinFailed);
        assert_eq!(session.state(), SessionState::Configuring);
        assert!(transport(&mut session).reset_levels().is_empty());

        assert_eq!(tick(&mut session), TickOutcome::JoinFailed);
        assert_eq!(transport(&mut session).reset_levels(), vec![false, true]);
        assert!(commands(&mut session).contains(&"AT+BAND=5".to_string()));
    }

    #[test]
    fn test_join_timeout() {
        let config = SessionConfig {
            join_timeout_ticks: 3,
            ..test_config()
        };
        let mut session = session_with(config, healthy_modem());

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        assert_eq!(tick(&mut session), TickOutcome::AwaitingJoin);
        assert_eq!(tick(&mut session), TickOutcome::AwaitingJoin);
        assert_eq!(tick(&mut session), TickOutcome::JoinFailed);
        assert_eq!(session.state(), SessionState::JoinTriggered);
    }

    #[test]
    fn test_probe_failure_resets_and_configures() {
        let modem = healthy_modem();
        modem.respond_once("AT", b"\r\nAT_ERROR\r\n");
        let mut session = session_with(test_config(), modem);

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        assert_eq!(session.state(), SessionState::JoinInProgress);
        assert_eq!(transport(&mut session).reset_levels(), vec![false, true]);

        let sent = commands(&mut session);
        let band = sent.iter().position(|c| c == "AT+BAND=5").unwrap();
        let join = sent.iter().position(|c| c == "AT+JOIN=1").unwrap();
        assert!(band < join);

        // NotConfigured -> Configuring -> JoinTriggered -> JoinInProgress
        assert_eq!(session.link().transitions(), 3);
    }

    #[test]
    fn test_silent_modem_is_unresponsive() {
        let mut session = session_with(test_config(), MockTransport::new());

        assert_eq!(tick(&mut session), TickOutcome::Unresponsive);
        assert_eq!(session.state(), SessionState::ModemUnresponsive);
        assert_eq!(session.tally().modem_unresponsive, 1);

        assert_eq!(tick(&mut session), TickOutcome::Unresponsive);
        assert_eq!(session.tally().modem_unresponsive, 2);
    }

    #[test]
    fn test_abp_join() {
        let config = SessionConfig {
            join_mode: JoinMode::Abp,
            adr: true,
            ..test_config()
        };
        let mut session = session_with(config, healthy_modem());

        assert_eq!(tick(&mut session), TickOutcome::Joined);
        assert_eq!(session.state(), SessionState::Joined);
        assert!(session.link().ack_received);
        assert!(!session.link().config_pending);

        let sent = commands(&mut session);
        let join = sent.iter().position(|c| c == "AT+JOIN=0").unwrap();
        assert!(sent.iter().position(|c| c == "AT+DADDR=00:00:00:00").unwrap() < join);
        assert!(sent.iter().any(|c| c.starts_with("AT+NWKSKEY=")));
        assert!(sent.iter().any(|c| c.starts_with("AT+APPSKEY=")));
        // Data rate is set even with ADR on
        assert_eq!(&sent[join + 1..], &["AT+ADR=1".to_string(), "AT+DR=4".to_string()]);
    }

    #[test]
    fn test_unconfirmed_uplinks_never_skip() {
        let mut session = session_with(test_config(), healthy_modem());
        join(&mut session);

        for _ in 0..4 {
            assert_eq!(tick(&mut session), TickOutcome::Sent);
        }
        assert_eq!(session.tally().missed_acks, 0);
    }

    #[test]
    fn test_confirmed_uplink_skip_limit() {
        let config = SessionConfig {
            confirmed: true,
            max_skipped_sends: 2,
            ..test_config()
        };
        let mut session = session_with(config, healthy_modem());
        join(&mut session);

        assert_eq!(tick(&mut session), TickOutcome::Sent);
        assert_eq!(tick(&mut session), TickOutcome::Skipped);
        assert_eq!(tick(&mut session), TickOutcome::Skipped);
        assert_eq!(tick(&mut session), TickOutcome::Sent);

        assert_eq!(session.tally().missed_acks, 1);
        assert_eq!(session.budget().skipped(), 0);

        let sends = commands(&mut session)
            .iter()
            .filter(|c| c.starts_with("AT+SEND=99:1:"))
            .count();
        assert_eq!(sends, 2);
    }

    #[test]
    fn test_ack_resets_skip_counter() {
        let config = SessionConfig {
            confirmed: true,
            max_skipped_sends: 3,
            ..test_config()
        };
        let mut session = session_with(config, healthy_modem());
        join(&mut session);

        assert_eq!(tick(&mut session), TickOutcome::Sent);
        assert_eq!(tick(&mut session), TickOutcome::Skipped);
        assert_eq!(session.budget().skipped(), 1);

        transport(&mut session).queue_rx_data(b"\r\n+EVT:SEND_CONFIRMED\r\n");
        assert_eq!(tick(&mut session), TickOutcome::Sent);
        assert_eq!(session.budget().skipped(), 0);
        assert_eq!(session.tally().missed_acks, 0);
        assert_eq!(session.link().acks, 1);
    }

    #[test]
    fn test_ack_between_sends_resets_skip_counter() {
        let config = SessionConfig {
            confirmed: true,
            max_skipped_sends: 3,
            send_every_ticks: 2,
            ..test_config()
        };
        let mut session = session_with(config, healthy_modem());
        join(&mut session);

        assert_eq!(tick(&mut session), TickOutcome::Sent);
        assert_eq!(tick(&mut session), TickOutcome::Idle);
        assert_eq!(tick(&mut session), TickOutcome::Skipped);
        assert_eq!(session.budget().skipped(), 1);

        // Ack arrives on a tick with no send due
        transport(&mut session).queue_rx_data(b"\r\n+EVT:SEND_CONFIRMED\r\n");
        assert_eq!(tick(&mut session), TickOutcome::Idle);
        assert_eq!(session.budget().skipped(), 0);
        assert!(session.link().ack_received);

        assert_eq!(tick(&mut session), TickOutcome::Sent);
        assert_eq!(session.tally().missed_acks, 0);
    }

    #[test]
    fn test_send_decimation() {
        let config = SessionConfig {
            send_every_ticks: 3,
            ..test_config()
        };
        let mut session = session_with(config, healthy_modem());
        join(&mut session);

        assert_eq!(tick(&mut session), TickOutcome::Sent);
        assert_eq!(tick(&mut session), TickOutcome::Idle);
        assert_eq!(tick(&mut session), TickOutcome::Idle);
        assert_eq!(tick(&mut session), TickOutcome::Sent);
    }

    #[test]
    fn test_low_data_rate_shrinks_payload() {
        let modem = healthy_modem();
        modem.respond("AT+DR=?", b"\r\n0\r\n\r\nOK\r\n");
        let mut session = session_with(test_config(), modem);
        join(&mut session);

        let mut snapshot = SensorSnapshot {
            pressure_hpa: 1013.0,
            ..SensorSnapshot::default()
        };
        assert_eq!(block_on(session.tick(&mut snapshot)), TickOutcome::Sent);
        assert_eq!(session.data_rate(), 0);
        assert_eq!(
            commands(&mut session).last().map(String::as_str),
            Some("AT+SEND=99:0:00732792")
        );
    }

    #[test]
    fn test_failed_probes_drop_link() {
        let mut session = session_with(test_config(), healthy_modem());
        join(&mut session);

        // Everything but the data rate query goes silent
        transport(&mut session).respond("AT", b"");
        transport(&mut session).respond("AT+DR=?", b"\r\n4\r\n\r\nOK\r\n");

        assert_eq!(tick(&mut session), TickOutcome::LinkLost);
        assert_eq!(session.state(), SessionState::Configuring);
        assert!(!commands(&mut session).iter().any(|c| c.starts_with("AT+SEND")));
    }

    #[test]
    fn test_no_network_urc_drops_link() {
        let mut session = session_with(test_config(), healthy_modem());
        join(&mut session);

        transport(&mut session).queue_rx_data(b"\r\nAT_NO_NETWORK_JOINED\r\n");
        assert_eq!(tick(&mut session), TickOutcome::LinkLost);
        assert_eq!(session.state(), SessionState::JoinTriggered);

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
    }

    #[test]
    fn test_send_failure_tallied() {
        let modem = healthy_modem();
        modem.respond("AT+SEND", b"\r\nAT_BUSY_ERROR\r\n\r\nAT_ERROR\r\n");
        let mut session = session_with(test_config(), modem);
        join(&mut session);

        assert_eq!(tick(&mut session), TickOutcome::SendFailed);
        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(session.tally().send_failures, 1);
        assert_eq!(session.tally().busy_errors, 1);
    }

    #[test]
    fn test_downlink_recorded() {
        let mut session = session_with(test_config(), healthy_modem());
        join(&mut session);

        transport(&mut session).queue_rx_data(b"\r\n+EVT:2:02:CAFE\r\n");
        tick(&mut session);

        let downlink = session.link().last_downlink.as_ref().unwrap();
        assert_eq!(downlink.port, 2);
        assert_eq!(downlink.payload.as_slice(), &[0xCA, 0xFE]);
    }

    #[test]
    fn test_disabled_session_does_nothing() {
        let mut session = session_with(test_config(), healthy_modem());
        join(&mut session);

        session.set_enabled(false);
        assert_eq!(tick(&mut session), TickOutcome::Disabled);
        assert_eq!(session.state(), SessionState::NotConfigured);
        assert!(commands(&mut session).is_empty());

        session.set_enabled(true);
        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
    }

    #[test]
    fn test_set_region_reconfigures() {
        let mut session = session_with(test_config(), healthy_modem());
        join(&mut session);

        session.set_region(Region::Us915);
        assert_eq!(session.state(), SessionState::Configuring);

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        assert!(commands(&mut session).contains(&"AT+BAND=8".to_string()));
    }

    #[test]
    fn test_set_credentials_forces_rejoin() {
        let mut session = session_with(test_config(), healthy_modem());
        join(&mut session);

        session.set_credentials(Credentials {
            app_eui: Some([0xAA; 8]),
            ..Credentials::none()
        });
        assert_eq!(session.state(), SessionState::JoinTriggered);

        assert_eq!(tick(&mut session), TickOutcome::JoinRequested);
        assert_eq!(
            commands(&mut session),
            vec![
                "AT".to_string(),
                "AT+APPEUI=AA:AA:AA:AA:AA:AA:AA:AA".to_string(),
                "AT+JOIN=1".to_string(),
            ]
        );
    }

    #[test]
    fn test_modem_versions_pass_through() {
        let modem = healthy_modem();
        modem.respond("AT+VER=?", b"\r\nAPP_VERSION:        V1.3.0\r\n\r\nOK\r\n");
        let mut session = session_with(test_config(), modem);

        let versions = block_on(session.modem_versions()).unwrap();
        assert_eq!(versions.app.major, 1);
        assert_eq!(versions.app.minor, 3);
        assert_eq!(session.state(), SessionState::NotConfigured);
    }

    #[test]
    fn test_enter_low_power() {
        let mut session = session_with(test_config(), healthy_modem());

        block_on(session.enter_low_power()).unwrap();
        assert_eq!(commands(&mut session), vec!["AT+CUST_LP".to_string()]);
    }
}
