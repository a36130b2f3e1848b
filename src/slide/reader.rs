//! Format-agnostic access to an opened slide.
//!
//! [`SlideReader`] is the seam between the adapter and whatever decodes the
//! pixels. [`crate::format::TiffSlide`] implements it for TIFF-based slides;
//! tests implement it over in-memory images.

use async_trait::async_trait;
use image::RgbImage;
use serde::Serialize;
use serde_json::Value;

use crate::error::TiffError;
use crate::format::SlideFormat;

/// Snapshot of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,

    /// Downsample relative to level 0 (1.0 for level 0)
    pub downsample: f64,
}

/// An opened multi-resolution image.
///
/// Level 0 is the full-resolution image; higher levels are progressively
/// smaller. Tiles are addressed by grid position within a level and come back
/// decoded; edge tiles may be smaller than the nominal tile size.
#[async_trait]
pub trait SlideReader: Send + Sync {
    fn format(&self) -> SlideFormat;

    fn level_count(&self) -> usize;

    fn level_info(&self, level: usize) -> Option<LevelInfo>;

    /// Vendor metadata document (nested JSON object).
    fn properties(&self) -> &Value;

    /// Decode one tile to RGB.
    async fn read_tile(&self, level: usize, tile_x: u32, tile_y: u32)
        -> Result<RgbImage, TiffError>;

    /// `(width, height)` of level 0.
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.level_info(level).map(|l| (l.width, l.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.level_info(level).map(|l| l.downsample)
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.level_info(level).map(|l| (l.tile_width, l.tile_height))
    }
}
