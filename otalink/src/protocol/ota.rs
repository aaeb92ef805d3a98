//! OTA transfer engine.
//!
//! Drives the three-phase exchange over a [`Port`]: announce the image
//! size, stream bounded chunks, confirm the end. Exactly one frame is in
//! flight at a time; every frame is resolved by a single reply byte (or
//! its timeout) before the next one is sent.
//!
//! ## Protocol Overview
//!
//! ```text
//! sender                          receiver
//!   |  START_OTA(total_size)        |
//!   |------------------------------>|
//!   |<----------- ACK --------------|   anything else aborts
//!   |  DATA_CHUNK(len <= 1021)      |
//!   |------------------------------>|
//!   |<-------- ACK / NAK -----------|   NAK/timeout: same range resent
//!   |   ... until total_size ...    |
//!   |  END_OTA                      |
//!   |------------------------------>|
//!   |<----------- ACK --------------|   anything else aborts
//! ```
//!
//! Chunks retry until acknowledged: link noise is the expected failure
//! mode and must be self-healing. A rejected start or unconfirmed end is
//! a session problem that retry will not fix, so both get exactly one
//! attempt.

use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::frame::{self, Frame, MAX_CHUNK_PAYLOAD, Reply};
use crate::source::FirmwareSource;

/// Default per-reply wait; covers the receiver's worst-case flash write
/// latency on a Bluetooth SPP link.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// Default settle time between clearing the buffers and the start frame.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default pause after the start frame is acknowledged, giving the
/// receiver time to prepare its flash partition.
pub const DEFAULT_START_DELAY: Duration = Duration::from_millis(300);

/// Default pacing delay between acknowledged chunks.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Default pause before the end frame, letting the receiver drain its
/// receive buffer.
pub const DEFAULT_END_DELAY: Duration = Duration::from_millis(500);

/// Default number of acknowledged chunks between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 50;

/// Transfer engine configuration.
///
/// The delays are pacing for the receiver's processing latency, not
/// protocol requirements; all of them may be tuned or zeroed.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Payload bytes per data chunk; clamped to `1..=1021` when used.
    pub chunk_size: usize,
    /// How long to wait for each reply byte.
    pub reply_timeout: Duration,
    /// Wait after clearing stale buffers at session start.
    pub settle_delay: Duration,
    /// Wait after the start frame is acknowledged.
    pub start_delay: Duration,
    /// Wait after each acknowledged chunk.
    pub chunk_delay: Duration,
    /// Wait before the end frame.
    pub end_delay: Duration,
    /// Acknowledged chunks between progress log lines; 0 disables them.
    pub progress_interval: u64,
    /// Retries allowed per chunk before giving up; `None` retries
    /// forever, which is the protocol's default behavior.
    pub max_chunk_retries: Option<u32>,
    /// Extra wait between attempts of the same chunk.
    pub retry_backoff: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_PAYLOAD,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            start_delay: DEFAULT_START_DELAY,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            end_delay: DEFAULT_END_DELAY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_chunk_retries: None,
            retry_backoff: Duration::ZERO,
        }
    }
}

impl TransferOptions {
    /// Set the requested chunk size (clamped to `1..=1021` when used).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the per-reply timeout.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the pacing delay between acknowledged chunks.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Cap the retries per chunk; `None` restores unbounded retry.
    #[must_use]
    pub fn with_max_chunk_retries(mut self, retries: Option<u32>) -> Self {
        self.max_chunk_retries = retries;
        self
    }

    /// Set the extra wait between attempts of the same chunk.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Zero every pacing delay (loopback links, tests).
    #[must_use]
    pub fn without_delays(mut self) -> Self {
        self.settle_delay = Duration::ZERO;
        self.start_delay = Duration::ZERO;
        self.chunk_delay = Duration::ZERO;
        self.end_delay = Duration::ZERO;
        self.retry_backoff = Duration::ZERO;
        self
    }

    /// Chunk size actually used on the wire.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_PAYLOAD)
    }
}

/// Outcome of one transfer session.
///
/// Reported for failed sessions too: `bytes_sent` then reflects how far
/// the acknowledged prefix got.
#[derive(Debug)]
pub struct TransferReport {
    /// Whether the session reached the confirmed-end state.
    pub success: bool,
    /// Bytes acknowledged by the receiver.
    pub bytes_sent: u64,
    /// Data chunk attempts, retries included.
    pub chunks_attempted: u64,
    /// Wall-clock session duration.
    pub elapsed: Duration,
    /// Why the session failed, if it did.
    pub error: Option<Error>,
}

impl TransferReport {
    /// Average throughput over the whole session, in KiB/s.
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput_kib(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes_sent as f64 / 1024.0) / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct SessionStats {
    bytes_sent: u64,
    chunks_attempted: u64,
}

/// OTA transfer session over a byte-stream port.
///
/// The port and firmware source are owned exclusively by the session
/// while [`OtaTransfer::run`] executes; there is no intra-session
/// concurrency.
pub struct OtaTransfer<'a, P: Port + ?Sized> {
    port: &'a mut P,
    options: TransferOptions,
}

impl<'a, P: Port + ?Sized> OtaTransfer<'a, P> {
    /// Create a session with default options.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            options: TransferOptions::default(),
        }
    }

    /// Create a session with custom options.
    pub fn with_options(port: &'a mut P, options: TransferOptions) -> Self {
        Self { port, options }
    }

    /// Run the session to a terminal state.
    ///
    /// `progress` is invoked after every acknowledged chunk with
    /// (bytes acknowledged, total bytes). The report carries statistics
    /// regardless of outcome; `error` is `None` exactly when the end
    /// frame was acknowledged.
    pub fn run<S, F>(&mut self, source: &mut S, mut progress: F) -> TransferReport
    where
        S: FirmwareSource + ?Sized,
        F: FnMut(u64, u64),
    {
        let started = Instant::now();
        let mut stats = SessionStats::default();
        let error = self.drive(source, &mut stats, &mut progress).err();
        if let Some(ref e) = error {
            warn!("Transfer failed: {e}");
        }
        TransferReport {
            success: error.is_none(),
            bytes_sent: stats.bytes_sent,
            chunks_attempted: stats.chunks_attempted,
            elapsed: started.elapsed(),
            error,
        }
    }

    fn drive<S, F>(
        &mut self,
        source: &mut S,
        stats: &mut SessionStats,
        progress: &mut F,
    ) -> Result<()>
    where
        S: FirmwareSource + ?Sized,
        F: FnMut(u64, u64),
    {
        let total = source.size()?;
        let total_wire = u32::try_from(total).map_err(|_| {
            Error::SourceUnavailable(format!("image too large for protocol: {total} bytes"))
        })?;

        info!(
            "Starting OTA transfer: {total} bytes over {}",
            self.port.name()
        );

        // Stale bytes from a previous session must never be read as replies.
        self.port.clear_buffers()?;
        self.port.set_timeout(self.options.reply_timeout)?;
        pause(self.options.settle_delay);

        let reply = self.exchange(&Frame::StartOta {
            total_size: total_wire,
        })?;
        if !reply.is_ack() {
            return Err(Error::StartRejected { reply });
        }
        debug!("Start frame acknowledged");
        pause(self.options.start_delay);

        self.stream_chunks(source, total, stats, progress)?;

        pause(self.options.end_delay);
        let reply = self.exchange(&Frame::EndOta)?;
        if !reply.is_ack() {
            return Err(Error::EndNotConfirmed { reply });
        }

        info!(
            "Transfer complete: {} bytes in {} chunk attempts",
            stats.bytes_sent, stats.chunks_attempted
        );
        Ok(())
    }

    /// Stream the image as acknowledged chunks.
    ///
    /// `offset` equals the sum of acknowledged chunk lengths at all
    /// times; a not-acknowledged chunk re-reads the same byte range on
    /// the next attempt.
    #[allow(clippy::cast_possible_truncation)] // remaining < chunk_size <= 1021 at the cast
    fn stream_chunks<S, F>(
        &mut self,
        source: &mut S,
        total: u64,
        stats: &mut SessionStats,
        progress: &mut F,
    ) -> Result<()>
    where
        S: FirmwareSource + ?Sized,
        F: FnMut(u64, u64),
    {
        let chunk_size = self.options.effective_chunk_size();
        let mut buf = vec![0u8; chunk_size];
        let mut offset: u64 = 0;
        let mut acked_chunks: u64 = 0;

        while offset < total {
            let remaining = total - offset;
            let want = if remaining < chunk_size as u64 {
                remaining as usize
            } else {
                chunk_size
            };
            let mut retries: u32 = 0;

            loop {
                if crate::is_interrupted() {
                    return Err(Error::Cancelled);
                }

                let got = source.read_at(offset, &mut buf[..want])?;
                if got == 0 {
                    return Err(Error::SourceTruncated { offset, total });
                }

                stats.chunks_attempted += 1;
                match self.exchange(&Frame::DataChunk {
                    payload: buf[..got].to_vec(),
                }) {
                    Ok(Reply::Ack) => {
                        offset += got as u64;
                        stats.bytes_sent = offset;
                        acked_chunks += 1;
                        progress(offset, total);
                        if self.options.progress_interval > 0
                            && acked_chunks % self.options.progress_interval == 0
                        {
                            info!(
                                "Progress: {offset}/{total} bytes ({}%)",
                                offset * 100 / total
                            );
                        }
                        break;
                    }
                    Ok(reply) => {
                        debug!("Chunk at offset {offset} not acknowledged ({reply}), retrying");
                    }
                    // The stream itself erroring is no worse than a lost
                    // frame: reposition and resend.
                    Err(Error::Io(e)) => {
                        warn!("Transport error on chunk at offset {offset}, retrying: {e}");
                    }
                    Err(e) => return Err(e),
                }

                retries += 1;
                if let Some(cap) = self.options.max_chunk_retries {
                    if retries > cap {
                        return Err(Error::Timeout(format!(
                            "chunk at offset {offset} unacknowledged after {cap} retries"
                        )));
                    }
                }
                pause(self.options.retry_backoff);
            }

            pause(self.options.chunk_delay);
        }
        Ok(())
    }

    /// Send one frame and decode the single reply byte.
    fn exchange(&mut self, frame: &Frame) -> Result<Reply> {
        let bytes = frame::encode(frame)?;
        trace!("TX opcode {:#04x}, {} bytes", frame.opcode(), bytes.len());
        self.port.write_all_bytes(&bytes)?;
        let reply = frame::decode_reply(self.port.read_one_byte()?);
        trace!("RX {reply}");
        Ok(reply)
    }
}

/// Run a whole transfer with default options and no progress observer.
pub fn transfer<P, S>(port: &mut P, source: &mut S, chunk_size_hint: usize) -> TransferReport
where
    P: Port + ?Sized,
    S: FirmwareSource + ?Sized,
{
    let options = TransferOptions::default().with_chunk_size(chunk_size_hint);
    OtaTransfer::with_options(port, options).run(source, |_, _| {})
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{OP_DATA_CHUNK, OP_END_OTA, OP_START_OTA, REPLY_ACK, REPLY_NAK};
    use crate::source::SliceSource;
    use std::collections::VecDeque;

    /// Mock port with a scripted reply sequence.
    ///
    /// Each scripted entry answers one read: `Some(byte)` delivers the
    /// byte, `None` simulates a timed-out wait. An exhausted script also
    /// times out.
    struct MockPort {
        replies: VecDeque<Option<u8>>,
        written: Vec<u8>,
        cleared: usize,
        timeout: Duration,
        write_calls: usize,
        fail_on_write_call: Option<usize>,
    }

    impl MockPort {
        fn new(replies: &[Option<u8>]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                written: Vec::new(),
                cleared: 0,
                timeout: Duration::ZERO,
                write_calls: 0,
                fail_on_write_call: None,
            }
        }

        /// Script: ACK for start, one ACK per chunk, ACK for end.
        fn happy(chunks: usize) -> Self {
            let mut replies = vec![Some(REPLY_ACK)];
            replies.extend(std::iter::repeat_n(Some(REPLY_ACK), chunks));
            replies.push(Some(REPLY_ACK));
            Self::new(&replies)
        }
    }

    impl std::io::Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.replies.pop_front() {
                Some(Some(byte)) => {
                    buf[0] = byte;
                    Ok(1)
                }
                // Scripted silence or an exhausted script: reply timeout
                Some(None) | None => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no reply",
                )),
            }
        }
    }

    impl std::io::Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.write_calls += 1;
            if self.fail_on_write_call == Some(self.write_calls) {
                return Err(std::io::Error::other("stream reset"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
            self.timeout = timeout;
            Ok(())
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        fn clear_buffers(&mut self) -> crate::Result<()> {
            self.cleared += 1;
            Ok(())
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn close(&mut self) -> crate::Result<()> {
            Ok(())
        }
    }

    fn fast_options() -> TransferOptions {
        TransferOptions::default().without_delays()
    }

    /// Split the raw written stream back into frames.
    fn written_frames(bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let end = match bytes[i] {
                OP_START_OTA => i + 5,
                OP_DATA_CHUNK => {
                    let len = usize::from(u16::from_be_bytes([bytes[i + 1], bytes[i + 2]]));
                    i + 3 + len
                }
                OP_END_OTA => i + 1,
                other => panic!("unknown opcode {other:#04x} at byte {i}"),
            };
            frames.push(frame::decode(&bytes[i..end]).unwrap());
            i = end;
        }
        frames
    }

    fn chunk_lens(frames: &[Frame]) -> Vec<usize> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::DataChunk { payload } => Some(payload.len()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_transfer_chunking() {
        // 2048 bytes at the maximum chunk size: 1021 + 1021 + 6
        let image: Vec<u8> = (0..2048u32).map(|i| i as u8).collect();
        let mut port = MockPort::happy(3);
        let mut source = SliceSource::new(&image);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(report.success, "error: {:?}", report.error);
        assert_eq!(report.bytes_sent, 2048);
        assert_eq!(report.chunks_attempted, 3);
        assert_eq!(port.cleared, 1);

        let frames = written_frames(&port.written);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0], Frame::StartOta { total_size: 2048 });
        assert_eq!(chunk_lens(&frames), vec![1021, 1021, 6]);
        assert_eq!(frames[4], Frame::EndOta);

        // Payload bytes arrive in image order
        let Frame::DataChunk { payload } = &frames[1] else {
            panic!("expected a data chunk");
        };
        assert_eq!(payload[..], image[..1021]);
    }

    #[test]
    fn test_empty_image_skips_streaming() {
        let mut port = MockPort::happy(0);
        let mut source = SliceSource::new(&[]);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(report.success);
        assert_eq!(report.bytes_sent, 0);
        assert_eq!(report.chunks_attempted, 0);

        // Start and end frames only, nothing in between
        let frames = written_frames(&port.written);
        assert_eq!(
            frames,
            vec![Frame::StartOta { total_size: 0 }, Frame::EndOta]
        );
    }

    #[test]
    fn test_start_nak_aborts_without_chunks() {
        let image = [0u8; 64];
        let mut port = MockPort::new(&[Some(REPLY_NAK)]);
        let mut source = SliceSource::new(&image);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(!report.success);
        assert_eq!(report.bytes_sent, 0);
        assert_eq!(report.chunks_attempted, 0);
        assert!(matches!(
            report.error,
            Some(Error::StartRejected { reply: Reply::Nak })
        ));
        // Only the start frame went out
        assert_eq!(written_frames(&port.written).len(), 1);
    }

    #[test]
    fn test_start_timeout_aborts() {
        let image = [0u8; 64];
        let mut port = MockPort::new(&[None]);
        let mut source = SliceSource::new(&image);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(matches!(
            report.error,
            Some(Error::StartRejected {
                reply: Reply::Timeout
            })
        ));
        assert_eq!(report.chunks_attempted, 0);
    }

    #[test]
    fn test_end_nak_fails_after_full_stream() {
        let image = [0xA5u8; 100];
        let mut port = MockPort::new(&[
            Some(REPLY_ACK), // start
            Some(REPLY_ACK), // single chunk
            Some(REPLY_NAK), // end
        ]);
        let mut source = SliceSource::new(&image);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(!report.success);
        // Every chunk was acknowledged before the end failed
        assert_eq!(report.bytes_sent, 100);
        assert_eq!(report.chunks_attempted, 1);
        assert!(matches!(
            report.error,
            Some(Error::EndNotConfirmed { reply: Reply::Nak })
        ));
    }

    #[test]
    fn test_end_unexpected_byte_fails() {
        let image = [0u8; 10];
        let mut port = MockPort::new(&[Some(REPLY_ACK), Some(REPLY_ACK), Some(0x77)]);
        let mut source = SliceSource::new(&image);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(matches!(
            report.error,
            Some(Error::EndNotConfirmed {
                reply: Reply::Unexpected(0x77)
            })
        ));
    }

    #[test]
    fn test_retry_convergence_with_naks_and_timeouts() {
        // Two chunks (60 + 40 bytes); every chunk is refused twice before
        // the ACK: once by NAK, once by silence.
        let image: Vec<u8> = (0..100u8).collect();
        let mut replies = vec![Some(REPLY_ACK)]; // start
        for _ in 0..2 {
            replies.push(Some(REPLY_NAK));
            replies.push(None);
            replies.push(Some(REPLY_ACK));
        }
        replies.push(Some(REPLY_ACK)); // end

        let mut port = MockPort::new(&replies);
        let mut source = SliceSource::new(&image);
        let options = fast_options().with_chunk_size(60);

        let mut seen = Vec::new();
        let report =
            OtaTransfer::with_options(&mut port, options).run(&mut source, |sent, total| {
                assert_eq!(total, 100);
                seen.push(sent);
            });

        assert!(report.success, "error: {:?}", report.error);
        assert_eq!(report.bytes_sent, 100);
        // 2 chunks, each with 2 failed attempts: 2 + 2*2
        assert_eq!(report.chunks_attempted, 6);

        // Offset is monotonic and tracks acknowledged lengths only
        assert_eq!(seen, vec![60, 100]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));

        // The retried chunk resent the same byte range each time
        let frames = written_frames(&port.written);
        assert_eq!(chunk_lens(&frames), vec![60, 60, 60, 40, 40, 40]);
        let Frame::DataChunk { payload } = &frames[1] else {
            panic!("expected a data chunk");
        };
        let Frame::DataChunk { payload: retried } = &frames[3] else {
            panic!("expected a data chunk");
        };
        assert_eq!(payload, retried);
    }

    #[test]
    fn test_transport_write_error_is_retried() {
        let image = [0x5Au8; 32];
        // Write calls: 1 = start, 2 = first chunk attempt (fails),
        // 3 = chunk resend, 4 = end.
        let mut port = MockPort::new(&[Some(REPLY_ACK), Some(REPLY_ACK), Some(REPLY_ACK)]);
        port.fail_on_write_call = Some(2);
        let mut source = SliceSource::new(&image);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(report.success, "error: {:?}", report.error);
        assert_eq!(report.bytes_sent, 32);
        assert_eq!(report.chunks_attempted, 2);
    }

    #[test]
    fn test_transport_error_on_start_is_fatal() {
        let image = [0u8; 32];
        let mut port = MockPort::new(&[Some(REPLY_ACK)]);
        port.fail_on_write_call = Some(1);
        let mut source = SliceSource::new(&image);

        let report =
            OtaTransfer::with_options(&mut port, fast_options()).run(&mut source, |_, _| {});

        assert!(!report.success);
        assert_eq!(report.chunks_attempted, 0);
        assert!(matches!(report.error, Some(Error::Io(_))));
    }

    #[test]
    fn test_truncated_source_fails() {
        /// Claims 100 bytes but only ever serves 40.
        struct TruncatedSource {
            inner: Vec<u8>,
        }
        impl FirmwareSource for TruncatedSource {
            fn size(&self) -> crate::Result<u64> {
                Ok(100)
            }
            fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> crate::Result<usize> {
                let mut slice = SliceSource::new(&self.inner);
                slice.read_at(offset, buf)
            }
        }

        let mut port = MockPort::new(&[Some(REPLY_ACK), Some(REPLY_ACK), Some(REPLY_ACK)]);
        let mut source = TruncatedSource {
            inner: vec![7u8; 40],
        };
        let options = fast_options().with_chunk_size(40);

        let report = OtaTransfer::with_options(&mut port, options).run(&mut source, |_, _| {});

        assert!(!report.success);
        assert_eq!(report.bytes_sent, 40);
        assert!(matches!(
            report.error,
            Some(Error::SourceTruncated {
                offset: 40,
                total: 100
            })
        ));
    }

    #[test]
    fn test_retry_cap_bounds_a_wedged_link() {
        let image = [1u8; 16];
        // Start ACKs, then nothing but NAKs
        let mut replies = vec![Some(REPLY_ACK)];
        replies.extend(std::iter::repeat_n(Some(REPLY_NAK), 10));
        let mut port = MockPort::new(&replies);
        let mut source = SliceSource::new(&image);
        let options = fast_options().with_max_chunk_retries(Some(3));

        let report = OtaTransfer::with_options(&mut port, options).run(&mut source, |_, _| {});

        assert!(!report.success);
        // First attempt plus the three allowed retries
        assert_eq!(report.chunks_attempted, 4);
        assert_eq!(report.bytes_sent, 0);
        assert!(matches!(report.error, Some(Error::Timeout(_))));
    }

    #[test]
    fn test_oversized_chunk_request_is_clamped() {
        let image = [2u8; 2000];
        let mut port = MockPort::happy(2);
        let mut source = SliceSource::new(&image);
        let options = fast_options().with_chunk_size(5000);

        let report = OtaTransfer::with_options(&mut port, options).run(&mut source, |_, _| {});

        assert!(report.success);
        let frames = written_frames(&port.written);
        assert_eq!(chunk_lens(&frames), vec![1021, 979]);
    }

    #[test]
    fn test_convenience_transfer_wrapper() {
        let image = [9u8; 10];
        let mut port = MockPort::happy(1);
        // Swallow the real-time pacing: the wrapper uses default options,
        // so keep the image to a single chunk.
        let mut source = SliceSource::new(&image);

        let report = transfer(&mut port, &mut source, 512);
        assert!(report.success);
        assert_eq!(report.bytes_sent, 10);
        assert_eq!(report.chunks_attempted, 1);
        assert!(report.throughput_kib() >= 0.0);
    }

    #[test]
    fn test_cancelled_between_chunks() {
        use std::cell::Cell;

        thread_local! {
            static CANCEL: Cell<bool> = const { Cell::new(false) };
        }

        // The checker reads a thread-local, so sessions running in other
        // test threads never observe this test's flag.
        crate::set_interrupt_checker(|| CANCEL.with(Cell::get));
        CANCEL.with(|c| c.set(false));

        let image = [3u8; 120];
        let mut port = MockPort::happy(2);
        let mut source = SliceSource::new(&image);
        let options = fast_options().with_chunk_size(60);

        let report = OtaTransfer::with_options(&mut port, options).run(&mut source, |sent, _| {
            if sent >= 60 {
                CANCEL.with(|c| c.set(true));
            }
        });
        CANCEL.with(|c| c.set(false));

        assert!(!report.success);
        assert_eq!(report.bytes_sent, 60);
        assert!(matches!(report.error, Some(Error::Cancelled)));
        // The end frame never went out
        let frames = written_frames(&port.written);
        assert!(!frames.contains(&Frame::EndOta));
    }

    #[test]
    fn test_options_defaults_match_reference_pacing() {
        let options = TransferOptions::default();
        assert_eq!(options.chunk_size, 1021);
        assert_eq!(options.reply_timeout, Duration::from_secs(3));
        assert_eq!(options.settle_delay, Duration::from_millis(500));
        assert_eq!(options.start_delay, Duration::from_millis(300));
        assert_eq!(options.chunk_delay, Duration::from_millis(20));
        assert_eq!(options.end_delay, Duration::from_millis(500));
        assert_eq!(options.progress_interval, 50);
        assert!(options.max_chunk_retries.is_none());
    }

    #[test]
    fn test_effective_chunk_size_clamps_both_ends() {
        assert_eq!(
            TransferOptions::default()
                .with_chunk_size(0)
                .effective_chunk_size(),
            1
        );
        assert_eq!(
            TransferOptions::default()
                .with_chunk_size(4096)
                .effective_chunk_size(),
            MAX_CHUNK_PAYLOAD
        );
        assert_eq!(
            TransferOptions::default()
                .with_chunk_size(256)
                .effective_chunk_size(),
            256
        );
    }
}
