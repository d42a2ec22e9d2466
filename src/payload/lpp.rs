//! Cayenne LPP uplink encoding
//!
//! Each record is `channel, type, data...` with big-endian fixed-point
//! data. Channels are numbered in write order starting at 0.

use crate::config::payload::{MAX_LORA_PAYLOAD, MIN_PAYLOAD_DATA_RATE};
use crate::error::ModemError;
use heapless::Vec;

/// Application payload buffer
pub type UplinkBuffer = Vec<u8, MAX_LORA_PAYLOAD>;

pub const DIGITAL_INPUT: u8 = 0x00;
pub const DIGITAL_OUTPUT: u8 = 0x01;
pub const ANALOG_INPUT: u8 = 0x02;
pub const TEMPERATURE: u8 = 0x67;
pub const HUMIDITY: u8 = 0x68;
pub const ACCELEROMETER: u8 = 0x71;
pub const BAROMETER: u8 = 0x73;
pub const GPS: u8 = 0x88;

/// Produces the payload for the next uplink
pub trait UplinkSource {
    /// Fill `buf` for an uplink at `data_rate`. Lower data rates carry less.
    fn fill_uplink(&mut self, data_rate: u8, buf: &mut UplinkBuffer) -> Result<(), ModemError>;
}

/// Appends LPP records to a buffer
pub struct LppWriter<'a> {
    buf: &'a mut UplinkBuffer,
    channel: u8,
}

impl<'a> LppWriter<'a> {
    pub fn new(buf: &'a mut UplinkBuffer) -> Self {
        Self { buf, channel: 0 }
    }

    /// Channel the next record will use
    pub fn next_channel(&self) -> u8 {
        self.channel
    }

    fn record(&mut self, kind: u8, data: &[u8]) -> Result<(), ModemError> {
        if self.buf.capacity() - self.buf.len() < data.len() + 2 {
            return Err(ModemError::Overflow);
        }
        let _ = self.buf.push(self.channel);
        let _ = self.buf.push(kind);
        let _ = self.buf.extend_from_slice(data);
        self.channel = self.channel.wrapping_add(1);
        Ok(())
    }

    /// Pressure in hPa, 0.1 hPa resolution
    pub fn barometer(&mut self, hpa: f32) -> Result<(), ModemError> {
        let value = (hpa * 10.0) as u16;
        self.record(BAROMETER, &value.to_be_bytes())
    }

    /// Temperature in degrees Celsius, 0.1 resolution
    pub fn temperature(&mut self, celsius: f32) -> Result<(), ModemError> {
        let value = (celsius * 10.0) as i16;
        self.record(TEMPERATURE, &value.to_be_bytes())
    }

    /// Relative humidity in percent, 0.5 resolution
    pub fn humidity(&mut self, percent: f32) -> Result<(), ModemError> {
        let value = (percent * 2.0) as u8;
        self.record(HUMIDITY, &[value])
    }

    /// Acceleration per axis in milli-g
    pub fn accelerometer(&mut self, x: i16, y: i16, z: i16) -> Result<(), ModemError> {
        let mut data = [0u8; 6];
        data[0..2].copy_from_slice(&x.to_be_bytes());
        data[2..4].copy_from_slice(&y.to_be_bytes());
        data[4..6].copy_from_slice(&z.to_be_bytes());
        self.record(ACCELEROMETER, &data)
    }

    /// Position in degrees and altitude in metres, packed as 24-bit fields
    pub fn gps(&mut self, latitude: f32, longitude: f32, altitude_m: f32) -> Result<(), ModemError> {
        let mut data = [0u8; 9];
        data[0..3].copy_from_slice(&int24((latitude * 10_000.0) as i32));
        data[3..6].copy_from_slice(&int24((longitude * 10_000.0) as i32));
        data[6..9].copy_from_slice(&int24((altitude_m * 100.0) as i32));
        self.record(GPS, &data)
    }

    /// Analog value in hundredths
    pub fn analog_input(&mut self, hundredths: i16) -> Result<(), ModemError> {
        self.record(ANALOG_INPUT, &hundredths.to_be_bytes())
    }

    pub fn digital_input(&mut self, value: u8) -> Result<(), ModemError> {
        self.record(DIGITAL_INPUT, &[value])
    }

    pub fn digital_output(&mut self, value: u8) -> Result<(), ModemError> {
        self.record(DIGITAL_OUTPUT, &[value])
    }
}

/// Lower 24 bits, big-endian
fn int24(value: i32) -> [u8; 3] {
    let bytes = value.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}

/// GNSS position fix
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    pub latitude: f32,
    pub longitude: f32,
    pub altitude_m: f32,
}

/// Latest sensor readings
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    pub pressure_hpa: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    /// Acceleration in milli-g
    pub accel_mg: [i16; 3],
    pub gps: Option<GpsFix>,
    pub battery_mv: u16,
    /// Status LED state
    pub led_on: bool,
    /// Satellites used in the last fix
    pub satellites: u8,
}

impl UplinkSource for SensorSnapshot {
    fn fill_uplink(&mut self, data_rate: u8, buf: &mut UplinkBuffer) -> Result<(), ModemError> {
        buf.clear();
        let mut lpp = LppWriter::new(buf);

        lpp.barometer(self.pressure_hpa)?;
        if data_rate <= MIN_PAYLOAD_DATA_RATE {
            return Ok(());
        }

        lpp.temperature(self.temperature_c)?;
        lpp.humidity(self.humidity_pct)?;
        let [x, y, z] = self.accel_mg;
        lpp.accelerometer(x, y, z)?;
        if let Some(fix) = self.gps {
            lpp.gps(fix.latitude, fix.longitude, fix.altitude_m)?;
        }
        // Battery voltage in 10 mV steps
        lpp.analog_input((self.battery_mv / 10) as i16)?;
        lpp.digital_output(u8::from(self.led_on))?;
        lpp.digital_input(self.satellites)?;
        Ok(())
    }
}
