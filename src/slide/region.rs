//! Region reads and their output representations.
//!
//! A region is addressed by its top-left corner in level-0 coordinates and a
//! size in pixels of the requested level. It is assembled from the decoded
//! tiles that overlap it; anything outside the level bounds stays white.

use std::fmt;
use std::str::FromStr;

use image::{imageops, Rgb, RgbImage};
use ndarray::Array3;
use tracing::debug;

use crate::error::SlideError;

use super::reader::SlideReader;

/// Fill value for pixels outside the slide.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

// =============================================================================
// Output selection
// =============================================================================

/// Representation a region read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadAs {
    /// `(height, width, 3)` array
    Numpy,

    /// `(height, width, 3)` tensor tagged with a device
    Torch,

    /// RGB image
    #[default]
    Pil,
}

impl FromStr for ReadAs {
    type Err = SlideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numpy" => Ok(ReadAs::Numpy),
            "torch" => Ok(ReadAs::Torch),
            "pil" => Ok(ReadAs::Pil),
            other => Err(SlideError::InvalidArgument(format!(
                "Unsupported read_as value: {other}"
            ))),
        }
    }
}

impl fmt::Display for ReadAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadAs::Numpy => "numpy",
            ReadAs::Torch => "torch",
            ReadAs::Pil => "pil",
        })
    }
}

/// Compute device a region is requested for.
///
/// Pixels always live in host memory; the device is carried on tensor
/// outputs so callers can place them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl Device {
    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl FromStr for Device {
    type Err = SlideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SlideError::InvalidArgument(format!("Unknown device: {s}"));
        match s {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            _ => {
                let index = s.strip_prefix("cuda:").ok_or_else(invalid)?;
                index.parse().map(Device::Cuda).map_err(|_| invalid())
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// Region pixels with the device they were requested for.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Array3<u8>,
    device: Device,
}

impl Tensor {
    pub fn new(data: Array3<u8>, device: Device) -> Self {
        Tensor { data, device }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// `[height, width, channels]`
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    /// Channel-first copy, `[channels, height, width]`.
    pub fn to_chw(&self) -> Array3<u8> {
        self.data.view().permuted_axes([2, 0, 1]).to_owned()
    }

    pub fn into_inner(self) -> Array3<u8> {
        self.data
    }
}

/// Result of a region read.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutput {
    Array(Array3<u8>),
    Tensor(Tensor),
    Image(RgbImage),
}

impl RegionOutput {
    pub fn from_image(image: RgbImage, read_as: ReadAs, device: Device) -> Self {
        match read_as {
            ReadAs::Numpy => RegionOutput::Array(image_to_array(&image)),
            ReadAs::Torch => RegionOutput::Tensor(Tensor::new(image_to_array(&image), device)),
            ReadAs::Pil => RegionOutput::Image(image),
        }
    }

    /// `(width, height)` of the region.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            RegionOutput::Array(a) => array_dimensions(a),
            RegionOutput::Tensor(t) => array_dimensions(&t.data),
            RegionOutput::Image(img) => img.dimensions(),
        }
    }

    pub fn into_array(self) -> Option<Array3<u8>> {
        match self {
            RegionOutput::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> Option<Tensor> {
        match self {
            RegionOutput::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<RgbImage> {
        match self {
            RegionOutput::Image(img) => Some(img),
            _ => None,
        }
    }

    /// Convert any representation to an RGB image.
    pub fn to_image(&self) -> RgbImage {
        match self {
            RegionOutput::Array(a) => array_to_image(a),
            RegionOutput::Tensor(t) => array_to_image(&t.data),
            RegionOutput::Image(img) => img.clone(),
        }
    }
}

fn array_dimensions(array: &Array3<u8>) -> (u32, u32) {
    let (height, width, _) = array.dim();
    (width as u32, height as u32)
}

/// `(height, width, 3)` array of an RGB image.
pub fn image_to_array(image: &RgbImage) -> Array3<u8> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[c]
    })
}

/// RGB image of a `(height, width, channels)` array.
///
/// Missing channels are repeated from the last one present.
pub fn array_to_image(array: &Array3<u8>) -> RgbImage {
    let (width, height) = array_dimensions(array);
    let channels = array.dim().2;
    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        if channels == 0 {
            return BACKGROUND;
        }
        Rgb(std::array::from_fn(|c| array[[y, x, c.min(channels - 1)]]))
    })
}

// =============================================================================
// Assembly
// =============================================================================

/// Assemble an RGB region from decoded tiles.
///
/// `location` is level-0 `(x, y)`, `size` is `(width, height)` at `level`.
/// The level must exist.
pub async fn read_region_rgb(
    reader: &dyn SlideReader,
    location: (i64, i64),
    level: usize,
    size: (u32, u32),
) -> Result<RgbImage, SlideError> {
    let info = reader.level_info(level).ok_or_else(|| {
        SlideError::InvalidArgument(format!(
            "Level {level} out of range (slide has {} levels)",
            reader.level_count()
        ))
    })?;

    let (width, height) = size;
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);
    if width == 0 || height == 0 {
        return Ok(canvas);
    }

    let origin_x = (location.0 as f64 / info.downsample).floor() as i64;
    let origin_y = (location.1 as f64 / info.downsample).floor() as i64;

    // Visible part of the request, in level pixels
    let x0 = origin_x.max(0);
    let y0 = origin_y.max(0);
    let x1 = origin_x.saturating_add(width as i64).min(info.width as i64);
    let y1 = origin_y.saturating_add(height as i64).min(info.height as i64);
    if x0 >= x1 || y0 >= y1 || info.tile_width == 0 || info.tile_height == 0 {
        return Ok(canvas);
    }

    let tile_w = info.tile_width as i64;
    let tile_h = info.tile_height as i64;
    let tiles_x = (x0 / tile_w)..=((x1 - 1) / tile_w);
    let tiles_y = (y0 / tile_h)..=((y1 - 1) / tile_h);

    debug!(
        level,
        origin_x,
        origin_y,
        width,
        height,
        tiles = tiles_x.clone().count() * tiles_y.clone().count(),
        "Assembling region"
    );

    for tile_y in tiles_y {
        for tile_x in tiles_x.clone() {
            let tile = reader
                .read_tile(level, tile_x as u32, tile_y as u32)
                .await?;

            let left = tile_x * tile_w;
            let top = tile_y * tile_h;

            // Edge tiles are padded past the level bounds
            let valid_w = (tile.width() as i64).min(info.width as i64 - left);
            let valid_h = (tile.height() as i64).min(info.height as i64 - top);
            if valid_w <= 0 || valid_h <= 0 {
                continue;
            }

            let visible = if valid_w == tile.width() as i64 && valid_h == tile.height() as i64 {
                tile
            } else {
                imageops::crop_imm(&tile, 0, 0, valid_w as u32, valid_h as u32).to_image()
            };

            imageops::replace(&mut canvas, &visible, left - origin_x, top - origin_y);
        }
    }

    Ok(canvas)
}
