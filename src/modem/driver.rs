//! AT command driver for the STM32WL LoRaWAN modem
//!
//! Runs one transaction at a time:
//! 1. Harvest residual bytes on the idle line and dispatch their URCs
//! 2. Write the encoded command
//! 3. Wait for the response to go quiet
//! 4. Classify each line; URCs found along the way are dispatched before
//!    the result is returned
//!
//! The receive buffer lives on the stack of each transaction and is lent
//! to the tokenizer and classifier by reference.

use crate::commands::parser::CommandParser;
use crate::commands::serialiser::{
    format_dev_addr, format_hex_octets, format_number, format_send_value, CommandSerialiser,
};
use crate::commands::types::{
    CommandForm, CommandId, DecodedValue, EuiKind, JoinMode, KeyKind, ModemVersions, Region,
    TransactionResult,
};
use crate::config::modem::{RESET_ASSERT_MS, RESET_BOOT_MS, RX_BUFFER_LEN};
use crate::config::{lorawan_defaults, payload::MAX_LORA_PAYLOAD};
use crate::error::ModemError;
use crate::modem::reader::{PollWindow, QuiescenceReader, RxBuffer};
use crate::modem::traits::ModemTransport;
use crate::protocol::lines::LineTokenizer;
use crate::protocol::urc::{classify, dispatch, Classified, CompletionCode, UrcHandler, UrcKind};
use crate::registry::traits::{Capabilities, LoraModem};
use heapless::Vec;

/// Timing parameters for the AT link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemTimings {
    /// Idle-line poll used to harvest URCs
    pub urc_poll: PollWindow,
    /// Wait for a command response
    pub response: PollWindow,
    /// Time the reset line is held low
    pub reset_assert_ms: u32,
    /// Boot time after reset is released
    pub reset_boot_ms: u32,
}

impl Default for ModemTimings {
    fn default() -> Self {
        Self {
            urc_poll: PollWindow::urc_poll(),
            response: PollWindow::response(),
            reset_assert_ms: RESET_ASSERT_MS,
            reset_boot_ms: RESET_BOOT_MS,
        }
    }
}

/// Last values written to or read from the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemSettings {
    pub region: Region,
    pub adr: bool,
    pub data_rate: u8,
}

impl Default for ModemSettings {
    fn default() -> Self {
        Self {
            region: Region::default(),
            adr: lorawan_defaults::ADR_ENABLED,
            data_rate: lorawan_defaults::DATA_RATE,
        }
    }
}

/// STM32WL AT modem driver
pub struct AtModem<T: ModemTransport> {
    transport: T,
    timings: ModemTimings,
    serialiser: CommandSerialiser,
    parser: CommandParser,
    settings: ModemSettings,
}

impl<T: ModemTransport> AtModem<T> {
    /// Create a new driver with default timings
    pub fn new(transport: T) -> Self {
        Self::with_timings(transport, ModemTimings::default())
    }

    pub fn with_timings(transport: T, timings: ModemTimings) -> Self {
        Self {
            transport,
            timings,
            serialiser: CommandSerialiser::new(),
            parser: CommandParser::new(),
            settings: ModemSettings::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn timings(&self) -> &ModemTimings {
        &self.timings
    }

    pub fn settings(&self) -> &ModemSettings {
        &self.settings
    }

    /// Execute one AT transaction.
    ///
    /// Encoding errors are returned before any I/O. Transport failures
    /// abort the transaction; everything else resolves to a
    /// [`TransactionResult`].
    pub async fn transact(
        &mut self,
        id: CommandId,
        form: CommandForm,
        value: Option<&[u8]>,
        urc: &mut dyn UrcHandler,
    ) -> Result<TransactionResult, ModemError> {
        let line = self.serialiser.encode(id, form, value)?;

        self.harvest(urc).await?;

        log::debug!("> {}", printable(&line));
        self.transport.write(&line).await?;

        let mut rx = RxBuffer::new();
        QuiescenceReader::response()
            .await_quiescent(&mut self.transport, &mut rx, self.timings.response)
            .await?;

        if completion_in(&rx).is_none() {
            // Give a slow completion line one more idle period
            QuiescenceReader::idle_poll()
                .await_quiescent(&mut self.transport, &mut rx, self.timings.urc_poll)
                .await?;
        }

        let result = self.process_response(&rx, form, urc)?;
        match &result {
            TransactionResult::Ok(_) => log::debug!("AT{}: OK", id.mnemonic()),
            TransactionResult::Error => log::warn!("AT{}: error", id.mnemonic()),
            TransactionResult::Timeout => log::warn!("AT{}: timeout", id.mnemonic()),
        }
        Ok(result)
    }

    /// Classify response lines, dispatching URCs and collecting GET value lines
    fn process_response(
        &self,
        rx: &[u8],
        form: CommandForm,
        urc: &mut dyn UrcHandler,
    ) -> Result<TransactionResult, ModemError> {
        let mut payload: Vec<u8, RX_BUFFER_LEN> = Vec::new();
        let mut completion = None;

        for line in LineTokenizer::new(rx) {
            log::debug!("< {}", line);
            match classify(line) {
                Classified::Completion(code) => {
                    // An error token anywhere fails the transaction
                    if completion != Some(CompletionCode::Error) {
                        completion = Some(code);
                    }
                }
                Classified::Urc(UrcKind::Unrecognized(_))
                    if form == CommandForm::Get
                        && completion.is_none()
                        && !line.starts_with("+EVT:") =>
                {
                    if !payload.is_empty() {
                        payload.push(b'\n').map_err(|_| ModemError::Overflow)?;
                    }
                    payload
                        .extend_from_slice(line.as_bytes())
                        .map_err(|_| ModemError::Overflow)?;
                }
                Classified::Urc(kind) => dispatch(&kind, urc),
            }
        }

        Ok(match completion {
            Some(CompletionCode::Ok) => TransactionResult::Ok(payload),
            Some(CompletionCode::Error) => TransactionResult::Error,
            None => TransactionResult::Timeout,
        })
    }

    /// Poll the idle line and dispatch every URC found
    async fn harvest(&mut self, urc: &mut dyn UrcHandler) -> Result<usize, ModemError> {
        let mut rx = RxBuffer::new();
        QuiescenceReader::idle_poll()
            .await_quiescent(&mut self.transport, &mut rx, self.timings.urc_poll)
            .await?;

        let mut count = 0;
        for line in LineTokenizer::new(&rx) {
            log::debug!("< {}", line);
            match classify(line) {
                Classified::Completion(code) => {
                    log::debug!("Ignoring stale completion {:?}", code);
                }
                Classified::Urc(kind) => {
                    dispatch(&kind, urc);
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Run a transaction and require `OK`, returning the payload
    async fn execute(
        &mut self,
        id: CommandId,
        form: CommandForm,
        value: Option<&[u8]>,
        urc: &mut dyn UrcHandler,
    ) -> Result<Vec<u8, RX_BUFFER_LEN>, ModemError> {
        match self.transact(id, form, value, urc).await? {
            TransactionResult::Ok(payload) => Ok(payload),
            TransactionResult::Error => Err(ModemError::Protocol),
            TransactionResult::Timeout => Err(ModemError::Timeout),
        }
    }

    async fn set(
        &mut self,
        id: CommandId,
        value: &[u8],
        urc: &mut dyn UrcHandler,
    ) -> Result<(), ModemError> {
        self.execute(id, CommandForm::Set, Some(value), urc).await.map(|_| ())
    }

    async fn control(&mut self, id: CommandId, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        self.execute(id, CommandForm::Control, None, urc).await.map(|_| ())
    }

    async fn query(
        &mut self,
        id: CommandId,
        urc: &mut dyn UrcHandler,
    ) -> Result<DecodedValue, ModemError> {
        let payload = self.execute(id, CommandForm::Get, None, urc).await?;
        self.parser.decode(id, CommandForm::Get, &payload).inspect_err(|_| {
            log::warn!("AT{}: malformed value {}", id.mnemonic(), printable(&payload));
        })
    }

    async fn query_number(
        &mut self,
        id: CommandId,
        urc: &mut dyn UrcHandler,
    ) -> Result<u32, ModemError> {
        match self.query(id, urc).await? {
            DecodedValue::Number(n) => Ok(n),
            _ => Err(ModemError::Parse),
        }
    }
}

impl<T: ModemTransport> LoraModem for AtModem<T> {
    async fn init(&mut self) -> Result<(), ModemError> {
        self.transport.init().await?;
        self.settings = ModemSettings::default();
        log::info!("Modem transport initialised");
        Ok(())
    }

    async fn deinit(&mut self) -> Result<(), ModemError> {
        self.transport.deinit().await?;
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            lora: true,
            low_power: true,
        }
    }

    async fn ping(&mut self, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        self.control(CommandId::Ping, urc).await
    }

    async fn hw_reset(&mut self, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        log::info!("Modem hardware reset");
        self.transport.reset(false).await?;
        self.transport.delay_ms(self.timings.reset_assert_ms).await;

        let mut stale = [0u8; RX_BUFFER_LEN];
        let discarded = self.transport.read(&mut stale).await?;
        if discarded > 0 {
            log::debug!("Discarded {} bytes before reset release", discarded);
        }

        self.transport.reset(true).await?;
        self.transport.delay_ms(self.timings.reset_boot_ms).await;

        self.harvest(urc).await?;
        self.settings = ModemSettings::default();
        self.ping(urc).await
    }

    async fn soft_reset(&mut self, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        self.control(CommandId::Reset, urc).await?;
        self.settings = ModemSettings::default();
        Ok(())
    }

    async fn manage_urcs(&mut self, urc: &mut dyn UrcHandler) -> Result<usize, ModemError> {
        self.harvest(urc).await
    }

    async fn send_binary(
        &mut self,
        port: u8,
        confirmed: bool,
        payload: &[u8],
        urc: &mut dyn UrcHandler,
    ) -> Result<(), ModemError> {
        if payload.len() > MAX_LORA_PAYLOAD {
            return Err(ModemError::InvalidParam);
        }
        let value = format_send_value(port, confirmed, payload)?;
        log::info!(
            "Uplink: port {}, {} bytes, {}",
            port,
            payload.len(),
            if confirmed { "confirmed" } else { "unconfirmed" }
        );
        self.set(CommandId::SendBinary, &value, urc).await
    }

    async fn version(&mut self, urc: &mut dyn UrcHandler) -> Result<ModemVersions, ModemError> {
        match self.query(CommandId::Version, urc).await? {
            DecodedValue::Versions(versions) => Ok(versions),
            _ => Err(ModemError::Parse),
        }
    }

    async fn eui(&mut self, kind: EuiKind, urc: &mut dyn UrcHandler) -> Result<[u8; 8], ModemError> {
        match self.query(kind.command(), urc).await? {
            DecodedValue::Eui(eui) => Ok(eui),
            _ => Err(ModemError::Parse),
        }
    }

    async fn set_eui(
        &mut self,
        kind: EuiKind,
        eui: &[u8; 8],
        urc: &mut dyn UrcHandler,
    ) -> Result<(), ModemError> {
        let value = format_hex_octets(eui)?;
        self.set(kind.command(), &value, urc).await
    }

    async fn key(&mut self, kind: KeyKind, urc: &mut dyn UrcHandler) -> Result<[u8; 16], ModemError> {
        match self.query(kind.command(), urc).await? {
            DecodedValue::Key(key) => Ok(key),
            _ => Err(ModemError::Parse),
        }
    }

    async fn set_key(
        &mut self,
        kind: KeyKind,
        key: &[u8; 16],
        urc: &mut dyn UrcHandler,
    ) -> Result<(), ModemError> {
        let value = format_hex_octets(key)?;
        self.set(kind.command(), &value, urc).await
    }

    async fn dev_addr(&mut self, urc: &mut dyn UrcHandler) -> Result<u32, ModemError> {
        match self.query(CommandId::DevAddr, urc).await? {
            DecodedValue::DevAddr(addr) => Ok(addr),
            _ => Err(ModemError::Parse),
        }
    }

    async fn set_dev_addr(&mut self, addr: u32, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        let value = format_dev_addr(addr)?;
        self.set(CommandId::DevAddr, &value, urc).await
    }

    async fn data_rate(&mut self, urc: &mut dyn UrcHandler) -> Result<u8, ModemError> {
        let value = self.query_number(CommandId::DataRate, urc).await?;
        let data_rate = u8::try_from(value).map_err(|_| ModemError::Parse)?;
        self.settings.data_rate = data_rate;
        Ok(data_rate)
    }

    async fn set_data_rate(&mut self, data_rate: u8, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        let value = format_number(data_rate as u32)?;
        self.set(CommandId::DataRate, &value, urc).await?;
        self.settings.data_rate = data_rate;
        Ok(())
    }

    async fn set_adr(&mut self, enabled: bool, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        self.set(CommandId::Adr, if enabled { b"1" } else { b"0" }, urc).await?;
        self.settings.adr = enabled;
        Ok(())
    }

    async fn set_region(&mut self, region: Region, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        let value = format_number(region.band() as u32)?;
        self.set(CommandId::Band, &value, urc).await?;
        log::info!("Region set to {}", region.name());
        self.settings.region = region;
        Ok(())
    }

    async fn join(&mut self, mode: JoinMode, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        log::info!("Join request ({:?})", mode);
        self.set(CommandId::Join, mode.wire_value(), urc).await
    }

    async fn join_status(&mut self, urc: &mut dyn UrcHandler) -> Result<bool, ModemError> {
        Ok(self.query_number(CommandId::JoinStatus, urc).await? != 0)
    }

    async fn enter_low_power(&mut self, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        self.control(CommandId::LowPower, urc).await
    }

    async fn reboot_dfu(&mut self, urc: &mut dyn UrcHandler) -> Result<(), ModemError> {
        log::warn!("Rebooting modem into bootloader");
        self.control(CommandId::DfuReboot, urc).await
    }
}

/// Scan for a completion token without dispatching anything
fn completion_in(rx: &[u8]) -> Option<CompletionCode> {
    LineTokenizer::new(rx).find_map(|line| match classify(line) {
        Classified::Completion(code) => Some(code),
        Classified::Urc(_) => None,
    })
}

fn printable(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes)
        .unwrap_or("<binary>")
        .trim_end_matches(['\r', '\n'])
}
