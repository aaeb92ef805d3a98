//! Error types for otalink.

use std::io;
use thiserror::Error;

use crate::protocol::frame::Reply;

/// Result type for otalink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for otalink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the byte stream or firmware file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Firmware source could not be opened or sized.
    #[error("Firmware source unavailable: {0}")]
    SourceUnavailable(String),

    /// Data chunk payload outside the 1..=1021 byte bound.
    #[error("Invalid chunk size: {len} bytes (must be 1..={max})", max = crate::protocol::frame::MAX_CHUNK_PAYLOAD)]
    InvalidChunkSize {
        /// Rejected payload length.
        len: usize,
    },

    /// Start frame was not acknowledged; the session never opened.
    #[error("Start of transfer rejected by device ({reply})")]
    StartRejected {
        /// Reply received in place of an ACK.
        reply: Reply,
    },

    /// End frame was not acknowledged; delivery is unconfirmed.
    #[error("End of transfer not confirmed by device ({reply})")]
    EndNotConfirmed {
        /// Reply received in place of an ACK.
        reply: Reply,
    },

    /// Source ran out of bytes before the declared size was reached.
    #[error("Firmware source truncated at offset {offset} of {total} bytes")]
    SourceTruncated {
        /// Offset at which the source stopped producing bytes.
        offset: u64,
        /// Size the source declared at session start.
        total: u64,
    },

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transfer aborted by the caller between chunks.
    #[error("Transfer cancelled")]
    Cancelled,

    /// Malformed frame bytes handed to the decoder.
    #[error("Malformed frame: {0}")]
    Frame(String),
}
