//! Integration tests for the STM32WL LoRaWAN modem.
//!
//! Talks AT directly to the modem through a USB-UART bridge, exercising the
//! same command set the firmware uses.

mod device;
mod tests;

use clap::Parser;
use colored::Colorize;

use device::{resolve_port, ModemClient};
use tests::{print_results, run_all_tests};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for the STM32WL LoRaWAN modem")]
struct Args {
    /// Serial port for the modem (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Seconds to listen for unsolicited events
    #[arg(long, default_value = "5")]
    listen: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let port = resolve_port(&args.port, args.baud)?;

    println!("{}", "LoRaWAN Modem Integration Tests".bold());
    println!("Port: {}", port);
    println!("Baud: {}", args.baud);
    println!();

    println!("Connecting to modem...");
    let mut modem = ModemClient::new(&port, args.baud)?;
    modem.drain()?;
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut modem, std::time::Duration::from_secs(args.listen));
    print_results(&results);

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
