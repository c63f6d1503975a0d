//! Device sync protocol.
//!
//! The whole table is sent as one ASCII line, `SET f0|f1|...|f8\n`, and the
//! device answers with a line reading `OK`. We poll a bounded number of lines
//! for that answer; each read is bounded by the port's own timeout.

use crate::mapping::MappingTable;
use log::{debug, info, trace, warn};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;
use thiserror::Error;

pub const BAUD_RATE: u32 = 9600;
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
pub const ACK_ATTEMPTS: usize = 10;
pub const ACK_LINE: &str = "OK";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Device not connected")]
    NotConnected,

    #[error("Serial write failed: {0}")]
    Transport(#[source] io::Error),

    #[error("Device did not confirm update ({attempts} reads without OK)")]
    NoAcknowledgement { attempts: usize },
}

/// Successful save: the device answered `OK` on read `attempt` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledged {
    pub attempt: usize,
}

/// A received line after lossy decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLine {
    pub text: String,
    /// True when undecodable bytes were dropped.
    pub lossy: bool,
}

/// Decode a raw line, dropping bytes that are not valid UTF-8, and trim it.
pub fn decode_line(raw: &[u8]) -> DecodedLine {
    let mut text = String::with_capacity(raw.len());
    let mut lossy = false;
    for chunk in raw.utf8_chunks() {
        text.push_str(chunk.valid());
        lossy |= !chunk.invalid().is_empty();
    }
    DecodedLine {
        text: text.trim().to_string(),
        lossy,
    }
}

/// Byte stream to the pad. An opened serial port in practice.
pub trait Port: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Port for T {}

/// An open serial session with the pad.
pub struct Connection<P = Box<dyn Port>> {
    port_name: String,
    reader: BufReader<P>,
    ack_attempts: usize,
}

impl<P: Read + Write> Connection<P> {
    pub fn new(port_name: impl Into<String>, port: P) -> Self {
        Self {
            port_name: port_name.into(),
            reader: BufReader::new(port),
            ack_attempts: ACK_ATTEMPTS,
        }
    }

    pub fn with_ack_attempts(mut self, attempts: usize) -> Self {
        self.ack_attempts = attempts;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &P {
        self.reader.get_ref()
    }

    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        let port = self.reader.get_mut();
        port.write_all(payload)?;
        port.flush()
    }

    /// Read one line. A timeout that delivered part of a line yields that part.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut raw = Vec::new();
        match self.reader.read_until(b'\n', &mut raw) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }
        Ok((!raw.is_empty()).then_some(raw))
    }

    fn wait_for_ack(&mut self) -> Result<Acknowledged, SyncError> {
        for attempt in 1..=self.ack_attempts {
            let raw = match self.read_line() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    trace!("Read {attempt}/{}: no data", self.ack_attempts);
                    continue;
                }
                Err(e) => {
                    warn!("Read {attempt}/{} failed: {e}", self.ack_attempts);
                    continue;
                }
            };

            let line = decode_line(&raw);
            if line.text.is_empty() {
                continue;
            }
            if line.lossy {
                // Never treat a repaired line as an acknowledgement.
                warn!(
                    "Device → {} (undecodable bytes dropped, raw {})",
                    line.text,
                    hex::encode(&raw)
                );
                continue;
            }

            info!("Device → {}", line.text);
            if line.text == ACK_LINE {
                debug!("Acknowledged on read {attempt}");
                return Ok(Acknowledged { attempt });
            }
        }

        Err(SyncError::NoAcknowledgement {
            attempts: self.ack_attempts,
        })
    }
}

/// Push `table` to the device and wait for its acknowledgement.
pub fn save<P: Read + Write>(
    table: &MappingTable,
    connection: Option<&mut Connection<P>>,
) -> Result<Acknowledged, SyncError> {
    let connection = connection.ok_or(SyncError::NotConnected)?;

    let payload = table.command();
    info!("Sending: {:?}", payload.trim_end());
    connection
        .send(payload.as_bytes())
        .map_err(SyncError::Transport)?;

    info!("Waiting for device response...");
    connection.wait_for_ack()
}
