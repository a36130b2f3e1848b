//! Slide file formats.
//!
//! TIFF-based slides are the only family read natively:
//!
//! - **Aperio SVS**: identified by `Aperio` in the first ImageDescription
//! - **Generic pyramidal TIFF**: any tiled TIFF or BigTIFF
//!
//! [`TiffSlide`] ties the TIFF engine, JPEG handling and vendor metadata
//! together behind [`crate::slide::SlideReader`].

pub mod detect;
pub mod jpeg;
pub mod svs;
pub mod tiff;
mod tiff_slide;

use std::path::Path;

use crate::error::FormatError;
use crate::io::{BlockCache, LocalFileReader};

pub use detect::{is_tiff_header, SlideFormat};
pub use svs::AperioDescription;
pub use tiff_slide::{DescriptiveTags, TiffSlide};

/// A slide opened from the local filesystem behind a block cache.
pub type LocalSlide = TiffSlide<BlockCache<LocalFileReader>>;

/// Open a local slide file.
///
/// `block_size` is in bytes and `cache_blocks` is the number of blocks the
/// cache keeps.
pub async fn open_local(
    path: impl AsRef<Path>,
    block_size: usize,
    cache_blocks: usize,
) -> Result<LocalSlide, FormatError> {
    let file = LocalFileReader::open(path).await?;
    TiffSlide::open(BlockCache::with_capacity(file, block_size, cache_blocks)).await
}
