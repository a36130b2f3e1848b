//! Command-line configuration for the `wsi-reader` binary.
//!
//! Every subcommand takes a slide path plus the shared [`Config`] options.
//! Options can also be set through environment variables with the `WSI_`
//! prefix:
//!
//! - `WSI_BLOCK_SIZE` - Block size in bytes for the read cache (default: 256KB)
//! - `WSI_CACHE_BLOCKS` - Number of blocks kept in the read cache (default: 64)
//! - `WSI_MPP` - Microns per pixel, overriding slide metadata
//! - `WSI_MAG` - Objective magnification, overriding slide metadata
//! - `WSI_MPP_X_KEY` / `WSI_MPP_Y_KEY` - Metadata keys checked first for mpp
//! - `WSI_TISSUE_SEG` - GeoJSON tissue contours for the slide
//! - `WSI_JPEG_QUALITY` - Quality of written JPEGs (default: 90)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::encoder::{is_valid_quality, DEFAULT_JPEG_QUALITY};
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::slide::{MppKeys, SlideOptions};

/// Smallest accepted cache block.
const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted cache block.
const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Reader - inspect and extract pixels from whole slide images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print dimensions, levels, calibration and format as JSON.
    Info(InfoArgs),

    /// Write a thumbnail of the whole slide.
    Thumbnail(ThumbnailArgs),

    /// Write one region of the slide.
    Region(RegionArgs),
}

impl Command {
    pub fn config(&self) -> &Config {
        match self {
            Command::Info(args) => &args.config,
            Command::Thumbnail(args) => &args.config,
            Command::Region(args) => &args.config,
        }
    }

    /// Validate the subcommand and its slide options.
    pub fn validate(&self) -> Result<(), String> {
        self.config().validate()?;
        match self {
            Command::Info(_) => Ok(()),
            Command::Thumbnail(args) => args.validate(),
            Command::Region(args) => args.validate(),
        }
    }
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Path to the slide file.
    pub slide: PathBuf,

    /// Block size in bytes for the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "WSI_BLOCK_SIZE")]
    pub block_size: usize,

    /// Number of blocks kept in the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CACHE_CAPACITY, env = "WSI_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Microns per pixel; skips the metadata lookup.
    #[arg(long, env = "WSI_MPP")]
    pub mpp: Option<f64>,

    /// Objective magnification; skips derivation.
    #[arg(long, env = "WSI_MAG")]
    pub mag: Option<f64>,

    /// Metadata key checked first for the x-axis mpp.
    #[arg(long, env = "WSI_MPP_X_KEY")]
    pub mpp_x_key: Option<String>,

    /// Metadata key checked first for the y-axis mpp.
    #[arg(long, env = "WSI_MPP_Y_KEY")]
    pub mpp_y_key: Option<String>,

    /// GeoJSON file with tissue contours for the slide.
    #[arg(long, env = "WSI_TISSUE_SEG")]
    pub tissue_seg: Option<PathBuf>,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }

        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }

        if let Some(mpp) = self.mpp {
            if !mpp.is_finite() || mpp <= 0.0 {
                return Err(format!("mpp must be a positive number, got {mpp}"));
            }
        }

        if let Some(mag) = self.mag {
            if !mag.is_finite() || mag <= 0.0 {
                return Err(format!("mag must be a positive number, got {mag}"));
            }
        }

        Ok(())
    }

    pub fn slide_options(&self) -> SlideOptions {
        let mut options = SlideOptions::new(&self.slide)
            .with_cache(self.block_size, self.cache_blocks)
            .with_mpp_keys(MppKeys {
                mpp_x: self.mpp_x_key.clone(),
                mpp_y: self.mpp_y_key.clone(),
            });
        options.mpp = self.mpp;
        options.mag = self.mag;
        options.tissue_seg_path = self.tissue_seg.clone();
        options
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    #[command(flatten)]
    pub config: Config,

    /// Include the full vendor metadata document.
    #[arg(long, default_value_t = false)]
    pub properties: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ThumbnailArgs {
    #[command(flatten)]
    pub config: Config,

    /// Thumbnail width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Thumbnail height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Output JPEG path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,
}

impl ThumbnailArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("thumbnail width and height must be greater than 0".to_string());
        }
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct RegionArgs {
    #[command(flatten)]
    pub config: Config,

    /// Left edge in level-0 pixels.
    #[arg(long, allow_negative_numbers = true, default_value_t = 0)]
    pub x: i64,

    /// Top edge in level-0 pixels.
    #[arg(long, allow_negative_numbers = true, default_value_t = 0)]
    pub y: i64,

    /// Pyramid level to read from.
    #[arg(long, default_value_t = 0)]
    pub level: usize,

    /// Region width in pixels of the chosen level.
    #[arg(long)]
    pub width: u32,

    /// Region height in pixels of the chosen level.
    #[arg(long)]
    pub height: u32,

    /// Device the region is requested for (cpu, cuda, cuda:N).
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Representation to read the region as (numpy, torch, pil).
    #[arg(long, default_value = "pil")]
    pub read_as: String,

    /// Output JPEG path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,
}

impl RegionArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("region width and height must be greater than 0".to_string());
        }
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
