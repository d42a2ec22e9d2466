//! Configuration constants for the ESP32-S3 sensor node with an STM32WL LoRaWAN modem

/// AT transport timing and buffer sizing
pub mod modem {
    /// Idle-line poll window used to harvest pending URCs
    pub const URC_POLL_TIMEOUT_MS: u32 = 1000;

    /// Window for a command response after the command is written
    pub const RESPONSE_TIMEOUT_MS: u32 = 2000;

    /// Number of polling slices per window
    pub const TIME_SLICES: u32 = 100;

    /// Receive accumulator capacity for one transaction
    pub const RX_BUFFER_LEN: usize = 1024;

    /// Longest single line kept by the tokenizer
    pub const MAX_LINE_LEN: usize = 560;

    /// Longest outbound command line, including "AT" and the trailing CR
    pub const MAX_COMMAND_LEN: usize = 560;

    /// Time the reset line is held low
    pub const RESET_ASSERT_MS: u32 = 10;

    /// Boot time allowed after releasing reset
    pub const RESET_BOOT_MS: u32 = 100;
}

/// LoRaWAN defaults applied until the host provides its own
pub mod lorawan_defaults {
    /// Region band index (EU868)
    pub const BAND_INDEX: u8 = 5;
    pub const ADR_ENABLED: bool = false;
    pub const DATA_RATE: u8 = 4;
    pub const CONFIRMED_UPLINKS: bool = false;
    /// Cayenne LPP application port
    pub const APP_PORT: u8 = 99;
    pub const USE_OTAA: bool = true;
}

/// Default commissioning values
pub mod commissioning {
    pub const APP_EUI: [u8; 8] = [0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01];

    pub const APP_KEY: [u8; 16] = [
        0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF, 0x4F,
        0x3C,
    ];

    pub const NWK_KEY: [u8; 16] = APP_KEY;

    pub const DEV_ADDR: u32 = 0x0000_0000;

    pub const NWK_S_KEY: [u8; 16] = APP_KEY;

    pub const APP_S_KEY: [u8; 16] = APP_KEY;
}

/// Session scheduling
pub mod session {
    /// Period between scheduler ticks
    pub const TICK_INTERVAL_MS: u64 = 1000;

    /// Uplink every N ticks while joined
    pub const SEND_EVERY_TICKS: u32 = 60;

    /// Ticks to wait for a join accept before retrying
    pub const JOIN_TIMEOUT_TICKS: u32 = 15;

    /// Ticks skipped while waiting for a confirmed-uplink acknowledgement
    pub const MAX_SKIPPED_SENDS: u8 = 2;
}

/// Payload limits
pub mod payload {
    /// Largest LoRaWAN application payload accepted by the modem
    pub const MAX_LORA_PAYLOAD: usize = 242;

    /// Data rate at or below which only the minimal record set is sent
    pub const MIN_PAYLOAD_DATA_RATE: u8 = 1;
}

/// UART link to the modem
pub mod uart {
    /// STM32WL AT slave default
    pub const BAUD_RATE: u32 = 9600;
    pub const TX_PIN: u8 = 17;
    pub const RX_PIN: u8 = 18;
    /// Active-low modem reset
    pub const RESET_PIN: u8 = 8;
}

/// Device registry sizing
pub mod registry {
    pub const MAX_INSTANCES: usize = 1;
}
