//! Slide format detection.
//!
//! Only TIFF-based slides are read. A file is:
//!
//! - **Aperio SVS** when the first IFD's ImageDescription contains `Aperio`
//! - **Generic pyramidal TIFF** for any other TIFF or BigTIFF
//!
//! Anything without a TIFF header is rejected as unsupported.

use serde::Serialize;

use super::tiff::{ByteOrder, TIFF_HEADER_SIZE};

/// Marker Aperio writes at the start of its ImageDescription.
const APERIO_MARKER: &str = "Aperio";

/// Detected slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlideFormat {
    /// Aperio SVS (abbreviated JPEG tiles plus JPEGTables)
    AperioSvs,

    /// Tiled TIFF with reduced-resolution IFDs
    GenericTiff,
}

impl SlideFormat {
    /// Classify from the first IFD's ImageDescription.
    pub fn from_description(description: Option<&str>) -> Self {
        match description {
            Some(d) if d.contains(APERIO_MARKER) => SlideFormat::AperioSvs,
            _ => SlideFormat::GenericTiff,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }

    /// Value of the `openslide.vendor` property.
    pub const fn vendor(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "aperio",
            SlideFormat::GenericTiff => "generic-tiff",
        }
    }
}

/// Whether `bytes` start with a TIFF or BigTIFF header.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match &bytes[..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };

    matches!(byte_order.read_u16(&bytes[2..4]), 42 | 43)
}
