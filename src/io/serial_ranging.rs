//! UART ultrasonic ranging (A02YYUW-style modules)
//!
//! Protocol:
//! - Baud: 9600, 8N1, one module per serial port
//! - Any byte written to the module triggers one measurement
//! - Response frame: 4 bytes, `0xFF, H, L, SUM`
//! - Distance in mm: `H << 8 | L`
//! - Checksum: `SUM = (0xFF + H + L) & 0xFF`

use crate::domain::types::{Distance, SensorId};
use crate::infra::config::Config;
use crate::io::ranging::{average_burst, Burst, RangingSource};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{error, info, warn};

// Protocol constants
const FRAME_HEADER: u8 = 0xFF;
const FRAME_LEN: usize = 4;
const TRIGGER_BYTE: u8 = 0x55;

/// Bytes kept while hunting for a header before the buffer is dropped
const MAX_BUFFERED_BYTES: usize = 64;

/// Frame checksum: low byte of header + high + low
#[inline]
fn frame_checksum(high: u8, low: u8) -> u8 {
    FRAME_HEADER.wrapping_add(high).wrapping_add(low)
}

/// Parse a 4-byte frame into whole centimetres.
///
/// Returns `None` for a bad header, a bad checksum, or a zero reading
/// (the module reports 0 when it hears no echo).
fn parse_frame(frame: &[u8; FRAME_LEN]) -> Option<u32> {
    if frame[0] != FRAME_HEADER {
        return None;
    }

    let (high, low, sum) = (frame[1], frame[2], frame[3]);
    if frame_checksum(high, low) != sum {
        warn!(
            checksum_error = true,
            raw_bytes = %format!("{:02X} {:02X} {:02X} {:02X}", frame[0], high, low, sum),
            "ranging_checksum_failed"
        );
        return None;
    }

    let mm = u32::from(high) << 8 | u32::from(low);
    if mm == 0 {
        return None;
    }
    Some(mm / 10)
}

/// Drop everything before the first header byte
fn synchronize_buffer(buffer: &mut Vec<u8>) {
    if buffer.first().map_or(true, |&b| b == FRAME_HEADER) {
        return;
    }

    match buffer.iter().position(|&b| b == FRAME_HEADER) {
        Some(start_idx) => {
            tracing::trace!(discarded = start_idx, "ranging_sync_discarded_bytes");
            buffer.drain(..start_idx);
        }
        None => {
            tracing::trace!(discarded = buffer.len(), "ranging_sync_no_header");
            buffer.clear();
        }
    }
}

/// Take one complete frame off the front of the buffer, if there is one
fn take_frame(buffer: &mut Vec<u8>) -> Option<[u8; FRAME_LEN]> {
    synchronize_buffer(buffer);
    if buffer.len() < FRAME_LEN {
        return None;
    }

    let mut frame = [0u8; FRAME_LEN];
    frame.copy_from_slice(&buffer[..FRAME_LEN]);
    buffer.drain(..FRAME_LEN);
    Some(frame)
}

/// One module on one serial port
struct SensorPort {
    sensor: SensorId,
    device: String,
    port: Option<SerialStream>,
    /// Accumulates bytes across reads; frames can arrive split
    read_buffer: Vec<u8>,
}

impl SensorPort {
    fn open(sensor: SensorId, device: &str, baud: u32) -> Self {
        let port = match tokio_serial::new(device, baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
        {
            Ok(p) => {
                info!(sensor = %sensor, device = %device, baud = %baud, "ranging_port_opened");
                Some(p)
            }
            Err(e) => {
                error!(sensor = %sensor, device = %device, error = %e, "ranging_port_open_failed");
                None
            }
        };

        Self { sensor, device: device.to_string(), port, read_buffer: Vec::with_capacity(16) }
    }

    /// Trigger one measurement and wait up to `timeout` for its frame
    async fn sample(&mut self, timeout: Duration) -> Option<u32> {
        let port = self.port.as_mut()?;

        // Anything left over, buffered here or still queued in the driver,
        // answers an earlier trigger that was cut off
        self.read_buffer.clear();
        if let Err(e) = port.clear(ClearBuffer::Input) {
            tracing::trace!(sensor = %self.sensor, error = %e, "ranging_input_flush_failed");
        }

        if let Err(e) = port.write_all(&[TRIGGER_BYTE]).await {
            warn!(sensor = %self.sensor, device = %self.device, error = %e, "ranging_write_error");
            return None;
        }

        let deadline = Instant::now() + timeout;
        let mut temp_buf = [0u8; 16];

        loop {
            if let Some(frame) = take_frame(&mut self.read_buffer) {
                return parse_frame(&frame);
            }

            match tokio::time::timeout_at(deadline, port.read(&mut temp_buf)).await {
                Ok(Ok(n)) if n > 0 => {
                    self.read_buffer.extend_from_slice(&temp_buf[..n]);
                    if self.read_buffer.len() > MAX_BUFFERED_BYTES {
                        self.read_buffer.clear();
                    }
                }
                Ok(Ok(_)) => {
                    // Zero bytes read, continue
                }
                Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => {
                    // Port-level timeout, deadline decides
                }
                Ok(Err(e)) => {
                    warn!(sensor = %self.sensor, error = %e, "ranging_read_error");
                    return None;
                }
                Err(_) => {
                    tracing::trace!(sensor = %self.sensor, "ranging_sample_timeout");
                    return None;
                }
            }
        }
    }
}

/// Ranging source backed by two serial ultrasonic modules
pub struct SerialRanging {
    ports: [SensorPort; 2],
    burst_size: usize,
    sample_timeout: Duration,
    burst_gap: Duration,
}

impl SerialRanging {
    /// Open both ports. A port that fails to open reads out of range forever.
    pub fn new(config: &Config) -> Self {
        let burst_size = config.burst_size().max(1);
        let sample_timeout_ms = config.sample_timeout_ms().max(1);

        Self {
            ports: [
                SensorPort::open(SensorId::A, config.sensor_a_device(), config.sensor_a_baud()),
                SensorPort::open(SensorId::B, config.sensor_b_device(), config.sensor_b_baud()),
            ],
            burst_size,
            sample_timeout: Duration::from_millis(sample_timeout_ms),
            burst_gap: Duration::from_millis(config.burst_gap_ms()),
        }
    }

    /// True when the port for `sensor` opened successfully
    pub fn is_connected(&self, sensor: SensorId) -> bool {
        self.ports[sensor.index()].port.is_some()
    }
}

#[async_trait]
impl RangingSource for SerialRanging {
    async fn measure(&mut self, sensor: SensorId) -> Distance {
        let port = &mut self.ports[sensor.index()];
        let mut samples = Burst::new();

        for i in 0..self.burst_size {
            let sample = port.sample(self.sample_timeout).await;
            samples.push(sample);
            if sample.is_none() {
                break;
            }
            if i + 1 < self.burst_size && !self.burst_gap.is_zero() {
                tokio::time::sleep(self.burst_gap).await;
            }
        }

        average_burst(&samples)
    }
}
