#![no_std]
#![no_main]

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_hal::Async;
use static_cell::StaticCell;

use lora_node_firmware::config;
use lora_node_firmware::modem::{AtModem, UartTransport};
use lora_node_firmware::registry::{DeviceRegistry, FunctionMask, ModemFunction};
use lora_node_firmware::session::{Credentials, Session, SessionConfig};
use lora_node_firmware::tasks::{self, SESSION_CHANNEL, SNAPSHOT_CHANNEL};

/// Concrete modem driver for this board
type BoardModem = AtModem<UartTransport<Uart<'static, Async>, Output<'static>>>;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // UART link to the STM32WL AT slave
    let uart = Uart::new(
        peripherals.UART1,
        UartConfig::default().with_baudrate(config::uart::BAUD_RATE),
    )
    .unwrap()
    .with_tx(peripherals.GPIO17)
    .with_rx(peripherals.GPIO18)
    .into_async();

    // Modem reset (active low), held released until the driver pulses it
    let modem_reset = Output::new(peripherals.GPIO8, Level::High, OutputConfig::default());

    let modem = AtModem::new(UartTransport::new(uart, modem_reset));

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, modem));
    })
}

#[embassy_executor::task]
async fn async_main(spawner: Spawner, modem: BoardModem) {
    let mut registry = DeviceRegistry::new();
    let functions = FunctionMask::NONE
        .with(ModemFunction::Lora)
        .with(ModemFunction::LowPower);

    match registry.register(0, modem, functions).await {
        Ok(caps) => log::info!("Modem registered: {:?}", caps),
        Err(e) => {
            log::error!("Modem registration failed: {}", e);
            return;
        }
    }

    let session = Session::new(
        registry,
        0,
        SessionConfig::default(),
        Credentials::default(),
    );

    spawner
        .spawn(modem_task(session, SNAPSHOT_CHANNEL.receiver(), SESSION_CHANNEL.receiver()))
        .unwrap();
}

/// Task that owns the LoRaWAN session
#[embassy_executor::task]
async fn modem_task(
    session: Session<BoardModem, { config::registry::MAX_INSTANCES }>,
    snapshots: tasks::SnapshotReceiver,
    commands: tasks::SessionCommandReceiver,
) {
    tasks::modem_task(session, snapshots, commands).await;
}
