//! AT modem client over a host serial port.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

/// Error tokens that terminate a response
const ERROR_TOKENS: &[&str] = &[
    "AT_ERROR",
    "AT_PARAM_ERROR",
    "AT_TEST_PARAM_OVERFLOW",
    "AT_RX_ERROR",
];

/// Response to one command
#[derive(Debug, Clone)]
pub struct AtResponse {
    /// Lines before the completion token, blank lines dropped
    pub lines: Vec<String>,
    /// `None` for OK, otherwise the error token
    pub error: Option<String>,
}

impl AtResponse {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Value lines, without unsolicited events
    pub fn values(&self) -> Vec<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|l| !l.starts_with("+EVT:") && !l.starts_with("AT_"))
            .collect()
    }
}

/// Find ports where something answers `AT` with `OK`
pub fn find_modem_ports(baud: u32) -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    let mut found = Vec::new();

    for port_info in ports {
        if !port_info.port_name.contains("ttyUSB") && !port_info.port_name.contains("ttyACM") {
            continue;
        }

        if let Ok(mut client) = ModemClient::new(&port_info.port_name, baud) {
            client.set_timeout(Duration::from_millis(500));
            if let Ok(response) = client.command("AT") {
                if response.is_ok() {
                    found.push(port_info.port_name.clone());
                }
            }
        }
    }

    Ok(found)
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str, baud: u32) -> Result<String> {
    if port_arg != "auto" {
        return Ok(port_arg.to_string());
    }
    match find_modem_ports(baud)?.into_iter().next() {
        Some(port) => Ok(port),
        None => anyhow::bail!("No modem found - check the USB-UART bridge and baud rate"),
    }
}

/// Line-oriented AT client
pub struct ModemClient {
    port: Box<dyn SerialPort>,
    timeout: Duration,
    /// Bytes received but not yet split into lines
    pending: Vec<u8>,
}

impl ModemClient {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
            pending: Vec::new(),
        })
    }

    /// Set the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Discard everything the modem has sent so far.
    pub fn drain(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        self.pending.clear();
        while self.next_line(Duration::from_millis(200))?.is_some() {}
        Ok(())
    }

    /// Send `line` followed by CR and collect the response.
    pub fn command(&mut self, line: &str) -> Result<AtResponse> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\r")?;
        self.port.flush()?;

        let deadline = Instant::now() + self.timeout;
        let mut lines = Vec::new();

        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let Some(line) = self.next_line(remaining)? else {
                break;
            };
            if line.is_empty() {
                continue;
            }
            if line == "OK" {
                return Ok(AtResponse { lines, error: None });
            }
            if ERROR_TOKENS.contains(&line.as_str()) {
                return Ok(AtResponse {
                    lines,
                    error: Some(line),
                });
            }
            lines.push(line);
        }

        anyhow::bail!("Timeout waiting for response to {}, got {:?}", line, lines);
    }

    /// Collect non-empty lines for `duration`.
    pub fn listen(&mut self, duration: Duration) -> Result<Vec<String>> {
        let deadline = Instant::now() + duration;
        let mut lines = Vec::new();

        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match self.next_line(remaining)? {
                Some(line) if !line.is_empty() => lines.push(line),
                Some(_) => {}
                None => break,
            }
        }

        Ok(lines)
    }

    /// Read until a CR/LF-terminated line is available or `wait` expires.
    fn next_line(&mut self, wait: Duration) -> Result<Option<String>> {
        let start = Instant::now();
        let mut buf = [0u8; 64];

        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n' || b == b'\r') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..pos]).trim().to_string();
                return Ok(Some(text));
            }

            if start.elapsed() >= wait {
                return Ok(None);
            }

            match self.port.read(&mut buf) {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}
