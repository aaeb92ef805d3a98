//! Port abstraction for byte-stream transports.
//!
//! The OTA engine talks to the device through the `Port` trait, which
//! abstracts over whatever presents the link as a byte stream:
//!
//! - a plain USB-UART serial port,
//! - a Bluetooth SPP link bound to a tty (`/dev/rfcomm0`) or COM port.
//!
//! ## Architecture
//!
//! The design separates I/O from protocol logic, so the protocol layer
//! can be driven against an in-memory port in tests:
//!
//! ```text
//! +------------------+
//! |  Protocol Layer  |
//! |   (frame, ota)   |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Port Trait    |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | Native SerialPort|
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use otalink::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> otalink::Result<()> {
//!     port.write_all_bytes(b"hello")?;
//!     let reply = port.read_one_byte()?;
//!     println!("reply: {reply:?}");
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{Error, Result};

/// Serial link configuration.
///
/// The OTA receiver speaks 8-N-1 without flow control, so only the port
/// path, baud rate and read timeout vary.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "/dev/rfcomm0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Unified trait for byte-stream transports.
///
/// Reads must honor the timeout set via [`Port::set_timeout`] and fail
/// with [`std::io::ErrorKind::TimedOut`] when no byte arrives in time.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current read timeout.
    fn timeout(&self) -> Duration;

    /// Discard any bytes queued in the input/output buffers.
    ///
    /// Called once at session start so stale bytes from a previous
    /// session are never mistaken for replies.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Read a single byte, waiting at most the configured timeout.
    ///
    /// Returns `Ok(None)` when the wait elapsed without a byte; hard
    /// stream failures surface as errors.
    fn read_one_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write all bytes and flush, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::NativePort;
