//! OTA transfer protocol.

pub mod frame;
pub mod ota;

// Re-export common types
pub use frame::{Frame, MAX_CHUNK_PAYLOAD, Reply, decode_reply, encode};
pub use ota::{OtaTransfer, TransferOptions, TransferReport, transfer};
