//! # WSI Reader
//!
//! Lazy reading of Whole Slide Images (WSI) for histopathology pipelines.
//!
//! A [`SlideAdapter`] opens a slide on first use, exposes its pyramid,
//! resolves microns-per-pixel calibration from vendor metadata, derives the
//! objective magnification, generates thumbnails and reads pixel regions as
//! arrays, tensors or images.
//!
//! ## Features
//!
//! - **Native pyramidal TIFF engine**: TIFF and BigTIFF in both byte orders,
//!   Aperio SVS metadata, JPEGTables merging for abbreviated tiles
//! - **Block-cached reads**: slides are read through fixed-size LRU blocks
//! - **Vendor calibration**: mpp lookup over flattened metadata with custom
//!   keys and a fixed fallback list
//! - **Tissue contours**: GeoJSON polygons loaded alongside the slide
//!
//! ## Architecture
//!
//! - [`io`] - Byte sources and block caching
//! - [`mod@format`] - TIFF parser, pyramid, JPEG handling and vendor metadata
//! - [`slide`] - Slide reader trait, adapter, calibration and region reads
//! - [`encoder`] - JPEG output
//! - [`config`] - CLI configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_reader::{Device, ReadAs, SlideAdapter, SlideOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wsi_reader::SlideError> {
//!     let adapter = SlideAdapter::new(SlideOptions::new("slide.svs").with_mpp(0.25));
//!
//!     let (width, height) = adapter.get_dimensions().await?;
//!     println!("{width}x{height}, mag {:?}", adapter.mag().await?);
//!
//!     let tile = adapter
//!         .read_region((0, 0), 0, (512, 512), Device::Cpu, ReadAs::Numpy)
//!         .await?
//!         .into_array();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod format;
pub mod io;
pub mod slide;

// Re-export commonly used types
pub use config::{Cli, Command, Config};
pub use error::{FormatError, IoError, OutputError, SlideError, TiffError};
pub use format::tiff::{
    ByteOrder, Compression, FieldType, Ifd, IfdEntry, PyramidLevel, TiffHeader, TiffPyramid,
    TiffTag, TileData, ValueReader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use format::{is_tiff_header, open_local, AperioDescription, SlideFormat, TiffSlide};
pub use io::{BlockCache, LocalFileReader, RangeReader};
pub use slide::{
    Device, LevelInfo, MppKeys, ReadAs, RegionOutput, SlideAdapter, SlideHandle, SlideOptions,
    SlideReader, Tensor, TissueContour,
};
