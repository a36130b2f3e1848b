use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Random-access byte source for a slide file.
///
/// The TIFF parser only ever asks for exact ranges, so implementations can be
/// backed by a local file, an in-memory buffer in tests, or a cache layer.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns [`IoError::RangeOutOfBounds`] if the range runs past the end.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Identifier used in log lines and error messages (usually the path).
    fn identifier(&self) -> &str;
}

/// Check `offset..offset + len` against `size`.
///
/// Shared by every reader so they all report the same error shape.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}
