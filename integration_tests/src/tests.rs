//! Integration test cases.

use std::time::Duration;

use colored::Colorize;

use crate::device::ModemClient;

/// Test result.
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl TestResult {
    fn pass() -> Self {
        Self {
            name: String::new(),
            passed: true,
            message: None,
        }
    }

    fn fail(message: &str) -> Self {
        Self {
            name: String::new(),
            passed: false,
            message: Some(message.to_string()),
        }
    }
}

/// Run a test function and print results as it happens.
fn run_test<F>(name: &str, modem: &mut ModemClient, test_fn: F) -> TestResult
where
    F: FnOnce(&mut ModemClient) -> TestResult,
{
    print!("  {} ... ", name);
    std::io::Write::flush(&mut std::io::stdout()).ok();

    let mut result = test_fn(modem);
    result.name = name.to_string();

    if result.passed {
        println!("{}", "PASS".green().bold());
    } else {
        println!("{}", "FAIL".red().bold());
        if let Some(msg) = &result.message {
            println!("    {}", msg.red());
        }
    }

    result
}

/// Run all tests and return results.
pub fn run_all_tests(modem: &mut ModemClient, listen: Duration) -> Vec<TestResult> {
    let mut results = Vec::new();

    results.push(run_test("AT answers OK", modem, test_ping));
    results.push(run_test("Repeated pings succeed", modem, test_repeated_ping));
    results.push(run_test("AT+VER=? reports versions", modem, test_version));
    results.push(run_test("AT+DEUI=? returns 8 octets", modem, test_device_eui));
    results.push(run_test("Data rate round trip", modem, test_data_rate_round_trip));
    results.push(run_test("Bad parameter is rejected", modem, test_param_error));
    results.push(run_test("Unsolicited events are well formed", modem, |m| {
        test_urc_harvest(m, listen)
    }));

    results
}

/// Print test results summary.
pub fn print_results(results: &[TestResult]) {
    println!("\n{}", "=".repeat(60));
    println!("{}", "Test Results".bold());
    println!("{}", "=".repeat(60));

    let mut passed = 0;
    let mut failed = 0;

    for result in results {
        if result.passed {
            println!("  {} {}", "[PASS]".green().bold(), result.name);
            passed += 1;
        } else {
            println!("  {} {}", "[FAIL]".red().bold(), result.name);
            if let Some(msg) = &result.message {
                println!("         {}", msg.red());
            }
            failed += 1;
        }
    }

    println!("{}", "-".repeat(60));
    println!(
        "  Total: {} passed, {} failed",
        passed.to_string().green(),
        if failed > 0 {
            failed.to_string().red()
        } else {
            failed.to_string().normal()
        }
    );
    println!("{}", "=".repeat(60));
}

/// Parse colon-separated hex octets
fn parse_octets(value: &str) -> Option<Vec<u8>> {
    value
        .split(':')
        .map(|part| u8::from_str_radix(part.trim(), 16).ok())
        .collect()
}

// --- Individual Tests ---

fn test_ping(modem: &mut ModemClient) -> TestResult {
    match modem.command("AT") {
        Ok(response) if response.is_ok() => TestResult::pass(),
        Ok(response) => TestResult::fail(&format!("Got {:?}", response.error)),
        Err(e) => TestResult::fail(&format!("Error: {}", e)),
    }
}

fn test_repeated_ping(modem: &mut ModemClient) -> TestResult {
    for i in 0..5 {
        match modem.command("AT") {
            Ok(response) if response.is_ok() => {}
            Ok(response) => {
                return TestResult::fail(&format!("Ping {} got {:?}", i + 1, response.error));
            }
            Err(e) => return TestResult::fail(&format!("Ping {} error: {}", i + 1, e)),
        }
    }

    TestResult::pass()
}

fn test_version(modem: &mut ModemClient) -> TestResult {
    match modem.command("AT+VER=?") {
        Ok(response) if response.is_ok() => {
            let values = response.values();
            if values.is_empty() {
                return TestResult::fail("No version lines");
            }
            print!("({}) ", values.join(" / "));
            TestResult::pass()
        }
        Ok(response) => TestResult::fail(&format!("Got {:?}", response.error)),
        Err(e) => TestResult::fail(&format!("Error: {}", e)),
    }
}

fn test_device_eui(modem: &mut ModemClient) -> TestResult {
    match modem.command("AT+DEUI=?") {
        Ok(response) if response.is_ok() => {
            let Some(value) = response.values().first().copied() else {
                return TestResult::fail("No value line");
            };
            match parse_octets(value) {
                Some(octets) if octets.len() == 8 => {
                    print!("({}) ", value);
                    TestResult::pass()
                }
                _ => TestResult::fail(&format!("Expected 8 octets, got '{}'", value)),
            }
        }
        Ok(response) => TestResult::fail(&format!("Got {:?}", response.error)),
        Err(e) => TestResult::fail(&format!("Error: {}", e)),
    }
}

fn read_data_rate(modem: &mut ModemClient) -> Result<u8, String> {
    let response = modem.command("AT+DR=?").map_err(|e| e.to_string())?;
    if !response.is_ok() {
        return Err(format!("Got {:?}", response.error));
    }
    response
        .values()
        .first()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| format!("Bad value: {:?}", response.lines))
}

fn test_data_rate_round_trip(modem: &mut ModemClient) -> TestResult {
    let previous = match read_data_rate(modem) {
        Ok(dr) => dr,
        Err(e) => return TestResult::fail(&e),
    };
    let target = if previous == 3 { 2 } else { 3 };

    let result = (|| {
        let response = modem
            .command(&format!("AT+DR={}", target))
            .map_err(|e| e.to_string())?;
        if !response.is_ok() {
            return Err(format!("Set refused: {:?}", response.error));
        }
        let read_back = read_data_rate(modem)?;
        if read_back != target {
            return Err(format!("Wrote {}, read {}", target, read_back));
        }
        Ok(())
    })();

    // Restore whatever was there before
    let _ = modem.command(&format!("AT+DR={}", previous));

    match result {
        Ok(()) => TestResult::pass(),
        Err(e) => TestResult::fail(&e),
    }
}

fn test_param_error(modem: &mut ModemClient) -> TestResult {
    match modem.command("AT+DR=99") {
        Ok(response) if response.is_ok() => TestResult::fail("Data rate 99 accepted"),
        Ok(_) => TestResult::pass(),
        Err(e) => TestResult::fail(&format!("Error: {}", e)),
    }
}

fn test_urc_harvest(modem: &mut ModemClient, listen: Duration) -> TestResult {
    let lines = match modem.listen(listen) {
        Ok(lines) => lines,
        Err(e) => return TestResult::fail(&format!("Error: {}", e)),
    };

    for line in &lines {
        let Some(body) = line.strip_prefix("+EVT:") else {
            continue;
        };
        // Downlinks are port:len:hex
        let fields: Vec<&str> = body.splitn(3, ':').collect();
        if let [port, len, hex] = fields.as_slice() {
            if port.parse::<u8>().is_err() {
                continue;
            }
            let declared = len.parse::<usize>().ok();
            if declared.and_then(|n| n.checked_mul(2)) != Some(hex.len()) {
                return TestResult::fail(&format!("Downlink length mismatch in '{}'", line));
            }
        }
    }

    print!("({} events) ", lines.len());
    TestResult::pass()
}
