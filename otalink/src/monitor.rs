//! Serial monitor for watching the device after an update.
//!
//! After the end frame is acknowledged the receiver reboots into the new
//! image; attaching a monitor to the same port shows its boot output.
//! The loop runs until the process-wide interrupt checker fires.

use std::fmt::Write as _;
use std::io;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};
use crate::port::Port;

/// Poll interval for the monitor read loop.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Monitor display options.
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    /// Prefix each output line with a wall-clock timestamp.
    pub timestamps: bool,
}

/// Reassembles UTF-8 text from arbitrary byte slices.
///
/// Device output arrives split at byte granularity; a multi-byte code
/// point may straddle two reads. Complete text is returned immediately,
/// an incomplete trailing sequence is held for the next push, and
/// invalid bytes become the replacement character.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    /// Feed received bytes, returning whatever decodes cleanly so far.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the tail, wait for more
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}

/// Applies line-ending normalization and optional timestamps.
#[derive(Debug)]
pub struct LineFormatter {
    timestamps: bool,
    at_line_start: bool,
}

impl LineFormatter {
    /// Create a formatter; `timestamps` prefixes each line with the
    /// wall-clock time it began.
    pub fn new(timestamps: bool) -> Self {
        Self {
            timestamps,
            at_line_start: true,
        }
    }

    /// Format a chunk of decoded device output.
    pub fn format(&mut self, text: &str) -> String {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let mut out = String::with_capacity(normalized.len() + 32);

        for ch in normalized.chars() {
            if ch == '\n' {
                out.push('\n');
                self.at_line_start = true;
                continue;
            }
            if self.at_line_start && self.timestamps {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default();
                let secs = now.as_secs();
                let _ = write!(
                    out,
                    "\x1b[90m[{:02}:{:02}:{:02}.{:03}]\x1b[0m ",
                    (secs / 3600) % 24,
                    (secs / 60) % 60,
                    secs % 60,
                    now.subsec_millis()
                );
            }
            self.at_line_start = false;
            out.push(ch);
        }

        out
    }
}

/// Echo device output to `out` until the interrupt checker fires.
pub fn run_monitor<P, W>(port: &mut P, out: &mut W, options: &MonitorOptions) -> Result<()>
where
    P: Port + ?Sized,
    W: io::Write,
{
    debug!("Monitoring {}", port.name());
    port.set_timeout(POLL_TIMEOUT)?;

    let mut accumulator = Utf8Accumulator::default();
    let mut formatter = LineFormatter::new(options.timestamps);
    let mut buf = [0u8; 512];

    while !crate::is_interrupted() {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let text = accumulator.push(&buf[..n]);
                if !text.is_empty() {
                    out.write_all(formatter.format(&text).as_bytes())?;
                    out.flush()?;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }

    debug!("Monitor stopped");
    Ok(())
}
