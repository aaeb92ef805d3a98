//! # otalink
//!
//! A library for transferring firmware images to embedded devices over
//! byte-stream links: plain serial, or Bluetooth SPP exposed as a tty.
//!
//! The transfer uses a minimal framed protocol with explicit per-frame
//! acknowledgement:
//!
//! - [`protocol::frame`]: wire codec for the three frame types and the
//!   single-byte replies
//! - [`protocol::ota`]: the transfer engine; starts the session, streams
//!   chunks with ACK/NAK-driven retry, confirms the end
//! - [`source`]: firmware image sources (file-backed or in-memory)
//! - [`port`]: byte-stream transport abstraction and the native
//!   `serialport` implementation
//! - [`discovery`]: candidate port enumeration by USB identity
//! - [`monitor`]: post-update serial monitor
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: serialization support for discovery types
//!
//! ## Example
//!
//! ```rust,no_run
//! use otalink::{FileSource, NativePort, OtaTransfer, TransferOptions};
//!
//! fn main() -> otalink::Result<()> {
//!     let mut source = FileSource::open("firmware.bin")?;
//!     let mut port = NativePort::open_simple("/dev/rfcomm0", 115200)?;
//!
//!     let options = TransferOptions::default().with_chunk_size(1021);
//!     let report = OtaTransfer::with_options(&mut port, options)
//!         .run(&mut source, |sent, total| {
//!             println!("{sent}/{total} bytes");
//!         });
//!
//!     match report.error {
//!         None => Ok(()),
//!         Some(e) => Err(e),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

#[cfg(feature = "native")]
pub mod discovery;
pub mod error;
pub mod monitor;
pub mod port;
pub mod protocol;
pub mod source;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). The first
/// registration wins; later calls are ignored.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
///
/// The transfer engine polls this between chunk attempts; the monitor
/// polls it between reads.
#[must_use]
pub fn is_interrupted() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use discovery::{
    DetectedPort, TransportKind, UsbDevice, best_port, detect_ports, device_ports,
};
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    error::{Error, Result},
    monitor::{LineFormatter, MonitorOptions, Utf8Accumulator, run_monitor},
    port::{Port, SerialConfig},
    protocol::frame::{Frame, MAX_CHUNK_PAYLOAD, Reply},
    protocol::ota::{OtaTransfer, TransferOptions, TransferReport, transfer},
    source::{FileSource, FirmwareSource, SliceSource},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_unset_is_false() {
        // Other tests may have installed a thread-local-backed checker;
        // either way this thread never requested interruption.
        assert!(!is_interrupted());
    }
}
