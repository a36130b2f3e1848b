//! Lazily opened slide with calibration, thumbnails and region reads.
//!
//! [`SlideAdapter`] holds only its [`SlideOptions`] until first use. The
//! first call that needs the slide opens it, reads the pyramid layout and
//! properties, resolves mpp and magnification and loads tissue contours if a
//! contour file was given. The result is a [`SlideHandle`] cached for the
//! lifetime of the adapter.
//!
//! ```no_run
//! use wsi_reader::slide::{SlideAdapter, SlideOptions, ReadAs, Device};
//!
//! # async fn example() -> Result<(), wsi_reader::SlideError> {
//! let adapter = SlideAdapter::new(SlideOptions::new("/data/slide.svs"));
//!
//! let (width, height) = adapter.get_dimensions().await?;
//! let thumbnail = adapter.get_thumbnail((512, 512)).await?;
//! let region = adapter
//!     .read_region((1024, 2048), 0, (256, 256), Device::Cpu, ReadAs::Numpy)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::error::{FormatError, IoError, SlideError};
use crate::format;
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};

use super::contours::{load_contours, TissueContour};
use super::metadata::{
    best_level_and_custom_downsample, resolve_calibration, resolve_magnification, MppKeys,
};
use super::reader::SlideReader;
use super::region::{read_region_rgb, Device, ReadAs, RegionOutput};

// =============================================================================
// Options
// =============================================================================

/// How to open a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideOptions {
    pub slide_path: PathBuf,

    /// Microns per pixel; when set, metadata is not consulted for it
    pub mpp: Option<f64>,

    /// Objective magnification; when set, it is not derived
    pub mag: Option<f64>,

    /// Metadata keys checked before the built-in mpp keys
    pub custom_mpp_keys: MppKeys,

    /// GeoJSON tissue contours for this slide
    pub tissue_seg_path: Option<PathBuf>,

    /// Block size of the read cache in bytes
    pub block_size: usize,

    /// Number of blocks the read cache keeps
    pub cache_blocks: usize,
}

impl SlideOptions {
    pub fn new(slide_path: impl Into<PathBuf>) -> Self {
        SlideOptions {
            slide_path: slide_path.into(),
            mpp: None,
            mag: None,
            custom_mpp_keys: MppKeys::default(),
            tissue_seg_path: None,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_BLOCK_CACHE_CAPACITY,
        }
    }

    pub fn with_mpp(mut self, mpp: f64) -> Self {
        self.mpp = Some(mpp);
        self
    }

    pub fn with_mag(mut self, mag: f64) -> Self {
        self.mag = Some(mag);
        self
    }

    pub fn with_mpp_keys(mut self, keys: MppKeys) -> Self {
        self.custom_mpp_keys = keys;
        self
    }

    pub fn with_tissue_seg(mut self, path: impl Into<PathBuf>) -> Self {
        self.tissue_seg_path = Some(path.into());
        self
    }

    pub fn with_cache(mut self, block_size: usize, cache_blocks: usize) -> Self {
        self.block_size = block_size;
        self.cache_blocks = cache_blocks;
        self
    }
}

// =============================================================================
// Opened slide
// =============================================================================

/// An opened slide and everything derived from it at initialization.
pub struct SlideHandle {
    reader: Box<dyn SlideReader>,
    dimensions: (u32, u32),
    level_dimensions: Vec<(u32, u32)>,
    level_downsamples: Vec<f64>,
    mpp: Option<f64>,
    mag: Option<f64>,
    tissue_contours: Option<Vec<TissueContour>>,
}

impl SlideHandle {
    /// Derive the handle from the reader in `slot`.
    ///
    /// The reader is only taken out of `slot` once every step succeeded, so
    /// a failed build leaves it in place.
    async fn build(
        slot: &mut Option<Box<dyn SlideReader>>,
        options: &SlideOptions,
    ) -> Result<Self, SlideError> {
        let path = &options.slide_path;
        let Some(reader) = slot.as_deref() else {
            return Err(SlideError::initialization(path, "no slide reader"));
        };

        let dimensions = reader
            .dimensions()
            .ok_or_else(|| SlideError::initialization(path, "slide has no pyramid levels"))?;

        let levels = 0..reader.level_count();
        let level_dimensions = levels
            .clone()
            .filter_map(|level| reader.level_dimensions(level))
            .collect();
        let level_downsamples = levels
            .filter_map(|level| reader.level_downsample(level))
            .collect();

        let properties = reader.properties();
        let mpp = options
            .mpp
            .or_else(|| resolve_calibration(properties, &options.custom_mpp_keys));
        let mag = options
            .mag
            .or_else(|| resolve_magnification(properties, mpp, &options.custom_mpp_keys));

        let tissue_contours = match &options.tissue_seg_path {
            Some(seg) => Some(load_contours(seg).await?),
            None => None,
        };

        info!(
            path = %path.display(),
            format = reader.format().name(),
            width = dimensions.0,
            height = dimensions.1,
            levels = reader.level_count(),
            mpp = ?mpp,
            mag = ?mag,
            "Initialized slide"
        );

        let reader = slot
            .take()
            .ok_or_else(|| SlideError::initialization(path, "no slide reader"))?;
        Ok(SlideHandle {
            reader,
            dimensions,
            level_dimensions,
            level_downsamples,
            mpp,
            mag,
            tissue_contours,
        })
    }

    pub fn reader(&self) -> &dyn SlideReader {
        self.reader.as_ref()
    }

    /// `(width, height)` of level 0.
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn level_count(&self) -> usize {
        self.level_dimensions.len()
    }

    pub fn level_dimensions(&self) -> &[(u32, u32)] {
        &self.level_dimensions
    }

    pub fn level_downsamples(&self) -> &[f64] {
        &self.level_downsamples
    }

    /// Nested vendor metadata.
    pub fn properties(&self) -> &Value {
        self.reader.properties()
    }

    pub fn mpp(&self) -> Option<f64> {
        self.mpp
    }

    pub fn mag(&self) -> Option<f64> {
        self.mag
    }

    pub fn tissue_contours(&self) -> Option<&[TissueContour]> {
        self.tissue_contours.as_deref()
    }

    /// Level and residual scale for a target downsample.
    pub fn best_level_and_custom_downsample(
        &self,
        downsample: f64,
    ) -> Result<(usize, f64), SlideError> {
        best_level_and_custom_downsample(&self.level_downsamples, downsample)
    }

    fn check_level(&self, level: usize) -> Result<(), SlideError> {
        if level >= self.level_count() {
            return Err(SlideError::InvalidArgument(format!(
                "Level {level} out of range (slide has {} levels)",
                self.level_count()
            )));
        }
        Ok(())
    }

    /// Read a region as RGB.
    ///
    /// `location` is level-0 `(x, y)` and `size` is `(width, height)` at
    /// `level`.
    pub async fn read_region_rgb(
        &self,
        location: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbImage, SlideError> {
        self.check_level(level)?;
        read_region_rgb(self.reader.as_ref(), location, level, size).await
    }

    pub async fn read_region(
        &self,
        location: (i64, i64),
        level: usize,
        size: (u32, u32),
        device: Device,
        read_as: ReadAs,
    ) -> Result<RegionOutput, SlideError> {
        self.check_level(level)?;
        debug!(?location, level, ?size, %device, %read_as, "Reading region");

        let image = read_region_rgb(self.reader.as_ref(), location, level, size).await?;
        Ok(RegionOutput::from_image(image, read_as, device))
    }

    /// Thumbnail of exactly `size` pixels.
    ///
    /// The whole of the level closest to the needed downsample is read and
    /// resized bilinearly.
    pub async fn get_thumbnail(&self, size: (u32, u32)) -> Result<RgbImage, SlideError> {
        let (target_width, target_height) = size;
        if target_width == 0 || target_height == 0 {
            return Err(SlideError::InvalidArgument(format!(
                "Thumbnail size must be non-zero, got {target_width}x{target_height}"
            )));
        }

        let (width, height) = self.dimensions;
        let downsample = f64::max(
            width as f64 / target_width as f64,
            height as f64 / target_height as f64,
        );
        let (level, _) = self.best_level_and_custom_downsample(downsample)?;
        let level_size = self.level_dimensions[level];

        debug!(level, downsample, ?level_size, "Generating thumbnail");

        let region = self.read_region_rgb((0, 0), level, level_size).await?;
        Ok(imageops::resize(
            &region,
            target_width,
            target_height,
            FilterType::Triangle,
        ))
    }
}

impl std::fmt::Debug for SlideHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideHandle")
            .field("format", &self.reader.format())
            .field("dimensions", &self.dimensions)
            .field("level_dimensions", &self.level_dimensions)
            .field("mpp", &self.mpp)
            .field("mag", &self.mag)
            .finish()
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// A slide that opens on first use.
pub struct SlideAdapter {
    options: SlideOptions,
    handle: OnceCell<SlideHandle>,

    /// Reader supplied up front instead of opening `slide_path`
    supplied: Mutex<Option<Box<dyn SlideReader>>>,
}

impl SlideAdapter {
    pub fn new(options: SlideOptions) -> Self {
        SlideAdapter {
            options,
            handle: OnceCell::new(),
            supplied: Mutex::new(None),
        }
    }

    /// Adapter over an already opened reader.
    ///
    /// `slide_path` only names the slide; it is not opened or checked.
    pub fn with_reader(options: SlideOptions, reader: Box<dyn SlideReader>) -> Self {
        SlideAdapter {
            options,
            handle: OnceCell::new(),
            supplied: Mutex::new(Some(reader)),
        }
    }

    /// Open the slide now.
    ///
    /// Fails with [`SlideError::NotFound`] when the slide or contour file is
    /// missing and [`SlideError::Initialization`] for anything else. Does
    /// nothing once the slide is open.
    pub async fn initialize(&self) -> Result<&SlideHandle, SlideError> {
        self.handle
            .get_or_try_init(|| async {
                let mut supplied = self.supplied.lock().await;
                if supplied.is_some() {
                    return SlideHandle::build(&mut supplied, &self.options).await;
                }

                let mut opened = Some(self.open_reader().await?);
                SlideHandle::build(&mut opened, &self.options).await
            })
            .await
    }

    async fn open_reader(&self) -> Result<Box<dyn SlideReader>, SlideError> {
        let path = &self.options.slide_path;

        match tokio::fs::metadata(path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SlideError::NotFound(path.clone()));
            }
            Err(e) => return Err(SlideError::initialization(path, e)),
        }

        let slide = format::open_local(path, self.options.block_size, self.options.cache_blocks)
            .await
            .map_err(|e| match e {
                FormatError::Io(IoError::NotFound(_)) => SlideError::NotFound(path.clone()),
                other => SlideError::initialization(path, other),
            })?;

        Ok(Box::new(slide))
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    pub fn options(&self) -> &SlideOptions {
        &self.options
    }

    pub fn path(&self) -> &Path {
        &self.options.slide_path
    }

    /// File name without its extension.
    pub fn name(&self) -> Option<&str> {
        self.options.slide_path.file_stem()?.to_str()
    }

    /// Extension including the leading dot, e.g. `.svs`.
    pub fn extension(&self) -> Option<String> {
        let ext = self.options.slide_path.extension()?.to_str()?;
        Some(format!(".{ext}"))
    }

    /// `(width, height)` of level 0.
    pub async fn get_dimensions(&self) -> Result<(u32, u32), SlideError> {
        Ok(self.initialize().await?.dimensions())
    }

    pub async fn level_count(&self) -> Result<usize, SlideError> {
        Ok(self.initialize().await?.level_count())
    }

    pub async fn level_dimensions(&self) -> Result<&[(u32, u32)], SlideError> {
        Ok(self.initialize().await?.level_dimensions())
    }

    pub async fn level_downsamples(&self) -> Result<&[f64], SlideError> {
        Ok(self.initialize().await?.level_downsamples())
    }

    pub async fn properties(&self) -> Result<&Value, SlideError> {
        Ok(self.initialize().await?.properties())
    }

    pub async fn mpp(&self) -> Result<Option<f64>, SlideError> {
        Ok(self.initialize().await?.mpp())
    }

    pub async fn mag(&self) -> Result<Option<f64>, SlideError> {
        Ok(self.initialize().await?.mag())
    }

    pub async fn tissue_contours(&self) -> Result<Option<&[TissueContour]>, SlideError> {
        Ok(self.initialize().await?.tissue_contours())
    }

    /// Microns per pixel from the slide metadata, ignoring any explicit value.
    pub async fn resolve_calibration(&self, custom_keys: &MppKeys) -> Result<Option<f64>, SlideError> {
        let handle = self.initialize().await?;
        Ok(resolve_calibration(handle.properties(), custom_keys))
    }

    /// Magnification from the slide metadata, ignoring any explicit value.
    pub async fn resolve_magnification(
        &self,
        custom_keys: &MppKeys,
    ) -> Result<Option<f64>, SlideError> {
        let handle = self.initialize().await?;
        Ok(resolve_magnification(handle.properties(), None, custom_keys))
    }

    pub async fn best_level_and_custom_downsample(
        &self,
        downsample: f64,
    ) -> Result<(usize, f64), SlideError> {
        self.initialize()
            .await?
            .best_level_and_custom_downsample(downsample)
    }

    pub async fn get_thumbnail(&self, size: (u32, u32)) -> Result<RgbImage, SlideError> {
        self.initialize().await?.get_thumbnail(size).await
    }

    pub async fn read_region(
        &self,
        location: (i64, i64),
        level: usize,
        size: (u32, u32),
        device: Device,
        read_as: ReadAs,
    ) -> Result<RegionOutput, SlideError> {
        self.initialize()
            .await?
            .read_region(location, level, size, device, read_as)
            .await
    }

    /// [`Self::read_region`] with the device and output named by string.
    ///
    /// Both names are checked before the slide is touched.
    pub async fn read_region_as(
        &self,
        location: (i64, i64),
        level: usize,
        size: (u32, u32),
        device: &str,
        read_as: &str,
    ) -> Result<RegionOutput, SlideError> {
        let read_as: ReadAs = read_as.parse()?;
        let device: Device = device.parse()?;
        self.read_region(location, level, size, device, read_as).await
    }
}

impl std::fmt::Debug for SlideAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideAdapter")
            .field("options", &self.options)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
