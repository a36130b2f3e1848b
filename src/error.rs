use std::path::PathBuf;

use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Operating system error while opening or reading
    #[error("Read error on {path}: {message}")]
    Read { path: String, message: String },
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files or decoding their tiles
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Tile compression the decoder cannot handle
    #[error("Unsupported compression: {0} (only JPEG is supported)")]
    UnsupportedCompression(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Tile bytes could not be decoded into pixels
    #[error("Failed to decode tile: {0}")]
    Decode(String),
}

/// Errors writing images produced by the CLI
#[derive(Debug, Clone, Error)]
pub enum OutputError {
    /// Image could not be encoded
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Encoded bytes could not be written
    #[error("Failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },
}

/// Errors surfaced by [`crate::slide::SlideAdapter`].
///
/// Initialization failures are split into a missing-file condition and a
/// generic wrapper; region arguments are rejected before any decode.
#[derive(Debug, Error)]
pub enum SlideError {
    /// Slide or tissue contour file does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Anything else that failed while opening the slide or reading metadata
    #[error("Error initializing WSI {}: {message}", path.display())]
    Initialization { path: PathBuf, message: String },

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Pixel data could not be read
    #[error("Failed to read region: {0}")]
    Read(#[from] TiffError),
}

impl SlideError {
    /// Wrap an underlying failure as an initialization error with context.
    pub fn initialization(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        SlideError::Initialization {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error is the missing-file condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SlideError::NotFound(_))
    }
}
