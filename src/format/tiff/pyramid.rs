//! Pyramid level identification.
//!
//! A slide file holds more IFDs than pyramid levels: Aperio files add a
//! stripped thumbnail, a label and a macro overview. Levels are picked out as
//! follows:
//!
//! 1. Only tiled IFDs with TileOffsets/TileByteCounts are candidates
//! 2. The largest candidate by area is level 0
//! 3. Every other candidate must keep level 0's aspect ratio; labels and
//!    macro images never do
//! 4. Downsample factors must strictly increase
//!
//! The downsample of a level is the mean of its two axis ratios to level 0.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::TiffTag;
use super::values::ValueReader;

/// Upper bound on the IFD chain length
const MAX_IFDS: usize = 256;

/// Relative difference allowed between the x and y downsample of a level
const ASPECT_TOLERANCE: f64 = 0.05;

/// Default compression when the tag is absent
const COMPRESSION_NONE: u16 = 1;

/// Photometric interpretation values that matter for tile decoding.
pub const PHOTOMETRIC_RGB: u16 = 2;
pub const PHOTOMETRIC_YCBCR: u16 = 6;

// =============================================================================
// PyramidLevel
// =============================================================================

/// One resolution layer of the slide.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Position in the pyramid (0 = full resolution)
    pub level_index: usize,

    /// Position in the file's IFD chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,

    /// Downsample relative to level 0 (1.0 for level 0)
    pub downsample: f64,

    pub compression: u16,
    pub photometric: Option<u16>,

    pub ifd: Ifd,
    pub tile_offsets_entry: IfdEntry,
    pub tile_byte_counts_entry: IfdEntry,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Build a level from a tiled IFD; `None` when tile structure is missing.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order).filter(|&w| w > 0)?;
        let tile_height = ifd.tile_height(byte_order).filter(|&h| h > 0)?;
        let width = ifd.image_width(byte_order).filter(|&w| w > 0)?;
        let height = ifd.image_height(byte_order).filter(|&h| h > 0)?;

        let tile_offsets_entry = ifd.get_entry_by_tag(TiffTag::TileOffsets)?.clone();
        let tile_byte_counts_entry = ifd.get_entry_by_tag(TiffTag::TileByteCounts)?.clone();
        let jpeg_tables_entry = ifd.get_entry_by_tag(TiffTag::JpegTables).cloned();

        let compression = ifd.compression(byte_order).unwrap_or(COMPRESSION_NONE);
        let photometric = ifd
            .get_entry_by_tag(TiffTag::PhotometricInterpretation)
            .and_then(|e| e.inline_u32(byte_order))
            .map(|v| v as u16);

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            downsample: 1.0,
            compression,
            photometric,
            ifd,
            tile_offsets_entry,
            tile_byte_counts_entry,
            jpeg_tables_entry,
        })
    }

    #[inline]
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    #[inline]
    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Row-major index of a tile, `None` outside the grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// Parsed structure of a pyramidal TIFF.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,

    /// Levels sorted by resolution, level 0 first
    pub levels: Vec<PyramidLevel>,

    /// Every IFD in chain order, pyramid or not
    pub ifds: Vec<Ifd>,
}

impl TiffPyramid {
    /// Read the header, walk the IFD chain and identify the levels.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = (reader.size() as usize).min(BIGTIFF_HEADER_SIZE);
        if header_len < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: reader.size(),
            });
        }
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::read_ifd_chain(reader, &header).await?;
        let levels = Self::identify_levels(&header, &ifds);

        debug!(
            source = reader.identifier(),
            bigtiff = header.is_bigtiff,
            ifds = ifds.len(),
            levels = levels.len(),
            "parsed tiff pyramid"
        );

        Ok(TiffPyramid {
            header,
            levels,
            ifds,
        })
    }

    async fn read_ifd_chain<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if offset >= reader.size() {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            // A chain that points back on itself ends here
            if !seen.insert(offset) {
                break;
            }

            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
            let entry_count = header.read_entry_count(&count_bytes);

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    fn identify_levels(header: &TiffHeader, ifds: &[Ifd]) -> Vec<PyramidLevel> {
        let mut candidates: Vec<PyramidLevel> = ifds
            .iter()
            .enumerate()
            .filter_map(|(i, ifd)| PyramidLevel::from_ifd(ifd.clone(), i, header.byte_order))
            .collect();

        // Stable sort keeps file order between equal areas
        candidates.sort_by_key(|level| std::cmp::Reverse(level.area()));

        let mut candidates = candidates.into_iter();
        let Some(base) = candidates.next() else {
            return Vec::new();
        };
        let base_width = base.width as f64;
        let base_height = base.height as f64;

        let mut levels = vec![base];
        for mut level in candidates {
            let downsample_x = base_width / level.width as f64;
            let downsample_y = base_height / level.height as f64;

            if !Self::same_aspect(downsample_x, downsample_y) {
                debug!(
                    ifd = level.ifd_index,
                    width = level.width,
                    height = level.height,
                    "skipping associated image"
                );
                continue;
            }

            let downsample = (downsample_x + downsample_y) / 2.0;
            let previous = levels.last().map(|l| l.downsample).unwrap_or(1.0);
            if downsample <= previous {
                continue;
            }

            level.level_index = levels.len();
            level.downsample = downsample;
            levels.push(level);
        }

        levels
    }

    /// Whether x/y downsample factors describe the same image shape.
    fn same_aspect(downsample_x: f64, downsample_y: f64) -> bool {
        let larger = downsample_x.max(downsample_y);
        (downsample_x - downsample_y).abs() / larger <= ASPECT_TOLERANCE
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    /// The first IFD of the file, where vendors put their descriptive tags.
    pub fn first_ifd(&self) -> Option<&Ifd> {
        self.ifds.first()
    }
}

// =============================================================================
// TileData
// =============================================================================

/// Tile locations and shared JPEG tables of one level.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Fetch TileOffsets, TileByteCounts and JPEGTables for a level.
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets = values.read_u64_array(&level.tile_offsets_entry).await?;
        let byte_counts = values.read_u64_array(&level.tile_byte_counts_entry).await?;

        let expected = level.tile_count() as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "level {} needs {} tiles, found {} offsets and {} byte counts",
                    level.level_index,
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match &level.jpeg_tables_entry {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// `(offset, byte_count)` of a tile.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}
