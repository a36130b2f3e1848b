//! JPEG tile stream handling.
//!
//! # Abbreviated streams
//!
//! Aperio and most pyramidal TIFF writers store each tile as an abbreviated
//! JPEG stream: SOI, the scan, EOI, with no quantization (DQT) or Huffman
//! (DHT) tables. The tables are stored once per level in the `JPEGTables` tag
//! and are merged in front of the scan before decoding:
//!
//! ```text
//! tables: SOI DQT DHT ... EOI
//! tile:   SOI SOS <scan> EOI
//! merged: SOI DQT DHT ... SOS <scan> EOI
//! ```
//!
//! # RGB tiles
//!
//! A three-component JPEG without a JFIF or Adobe marker is assumed by
//! decoders to be YCbCr. Tiles from IFDs with RGB photometric interpretation
//! get an Adobe APP14 segment with transform 0 so they decode unconverted.

use bytes::{Bytes, BytesMut};
use image::{ImageFormat, RgbImage};

use crate::error::TiffError;

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];

const MARKER_SOS: u8 = 0xDA;
const MARKER_DQT: u8 = 0xDB;
const MARKER_DHT: u8 = 0xC4;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP14: u8 = 0xEE;

/// Adobe APP14 segment declaring untransformed (RGB) components.
const ADOBE_RGB_SEGMENT: [u8; 16] = [
    0xFF, MARKER_APP14, 0x00, 0x0E, b'A', b'd', b'o', b'b', b'e', 0x00, 0x64, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

/// Marker codes that appear before the first SOS, in stream order.
///
/// The list ends with SOS when one was found. Standalone markers (RSTn, TEM)
/// carry no length and are skipped over.
fn header_markers(data: &[u8]) -> Vec<u8> {
    let mut markers = Vec::new();
    if data.len() < 4 || data[..2] != SOI {
        return markers;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        match marker {
            // fill byte or stuffed zero
            0xFF | 0x00 => pos += 1,
            0x01 | 0xD0..=0xD8 => pos += 2,
            _ => {
                markers.push(marker);
                if marker == MARKER_SOS || marker == 0xD9 || pos + 3 >= data.len() {
                    break;
                }
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
        }
    }

    markers
}

/// Whether the stream reaches its scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    let markers = header_markers(data);
    markers.last() == Some(&MARKER_SOS)
        && !markers
            .iter()
            .any(|&m| m == MARKER_DQT || m == MARKER_DHT)
}

/// Whether the stream carries its own quantization tables.
pub fn is_complete_stream(data: &[u8]) -> bool {
    header_markers(data).contains(&MARKER_DQT)
}

/// Whether the stream states its colour transform (JFIF or Adobe segment).
fn declares_color_transform(data: &[u8]) -> bool {
    header_markers(data)
        .iter()
        .any(|&m| m == MARKER_APP0 || m == MARKER_APP14)
}

/// Splice `tables` in front of an abbreviated tile stream.
///
/// The EOI of the tables and the SOI of the tile are dropped.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile_data.strip_prefix(&SOI).unwrap_or(tile_data);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len() + 2);
    if !tables.starts_with(&SOI) {
        merged.extend_from_slice(&SOI);
    }
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged.freeze()
}

/// Insert an Adobe RGB segment right after SOI.
fn with_rgb_segment(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + ADOBE_RGB_SEGMENT.len());
    out.extend_from_slice(&SOI);
    out.extend_from_slice(&ADOBE_RGB_SEGMENT);
    out.extend_from_slice(data.strip_prefix(&SOI).unwrap_or(data));
    out.freeze()
}

/// Turn raw tile bytes into a self-contained JPEG stream.
///
/// `rgb` marks tiles from IFDs with RGB photometric interpretation.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8], rgb: bool) -> Bytes {
    let stream = match tables {
        Some(tables) if !is_complete_stream(tile_data) && is_abbreviated_stream(tile_data) => {
            merge_jpeg_tables(tables, tile_data)
        }
        _ => Bytes::copy_from_slice(tile_data),
    };

    if rgb && !declares_color_transform(&stream) {
        with_rgb_segment(&stream)
    } else {
        stream
    }
}

/// Decode a complete JPEG stream to 8-bit RGB.
///
/// Greyscale tiles are expanded to three equal channels.
pub fn decode_jpeg(data: &[u8]) -> Result<RgbImage, TiffError> {
    image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map(|img| img.to_rgb8())
        .map_err(|e| TiffError::Decode(e.to_string()))
}
