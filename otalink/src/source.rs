//! Firmware image sources.
//!
//! The transfer engine addresses the image by absolute offset. A retried
//! chunk re-reads its byte range, so sources must support repeated reads
//! at the same offset.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};

/// A readable firmware image with a known size.
pub trait FirmwareSource {
    /// Total image size in bytes.
    ///
    /// Fails with [`Error::SourceUnavailable`] when the size cannot be
    /// determined; the engine refuses to start a session without it.
    fn size(&self) -> Result<u64>;

    /// Read bytes starting at `offset` into `buf`, returning the count.
    ///
    /// Returns fewer than `buf.len()` bytes only at end-of-data. Zero
    /// before the declared size is reached means the source is truncated.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

/// Firmware image backed by a file on disk.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Open a firmware image file.
    ///
    /// The size is taken from file metadata once; the session treats it
    /// as immutable from here on.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", path.display())))?;
        let size = file
            .metadata()
            .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", path.display())))?
            .len();
        debug!("Opened firmware image {} ({size} bytes)", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
        })
    }

    /// Path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FirmwareSource for FileSource {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::SourceUnavailable(format!("seek to {offset}: {e}")))?;

        // Fill as much of buf as the file allows; short reads mid-file are
        // retried so only end-of-file yields a partial count.
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(Error::SourceUnavailable(format!("read at {offset}: {e}")));
                }
            }
        }
        Ok(filled)
    }
}

/// Firmware image held in memory.
///
/// Used by tests and by callers that already have the image bytes.
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    /// Wrap an in-memory image.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl FirmwareSource for SliceSource<'_> {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}
