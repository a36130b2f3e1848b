//! Pyramidal TIFF slide reader.
//!
//! [`TiffSlide`] opens Aperio SVS and generic tiled TIFF files, loads the tile
//! tables of every pyramid level up front and builds the vendor properties
//! document. Tiles are fetched through the owned [`RangeReader`] and decoded
//! on demand.
//!
//! # Properties document
//!
//! ```text
//! tiff.*         descriptive tags of the first IFD
//! aperio.*       key/value pairs of an Aperio ImageDescription
//! openslide.*    vendor, mpp-x, mpp-y, objective-power, level-count
//! resolutions.*  level_count, level_dimensions, level_downsamples, level_tile_sizes
//! ```
//!
//! Values under `tiff`, `aperio` and `openslide` are strings, matching how
//! slide vendors publish them.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{FormatError, TiffError};
use crate::io::RangeReader;
use crate::slide::{LevelInfo, SlideReader};

use super::detect::{is_tiff_header, SlideFormat};
use super::jpeg::{decode_jpeg, prepare_tile_jpeg};
use super::svs::AperioDescription;
use super::tiff::{
    compression_name, Compression, Ifd, PyramidLevel, TiffHeader, TiffPyramid, TiffTag, TileData,
    ValueReader, BIGTIFF_HEADER_SIZE, PHOTOMETRIC_RGB,
};

/// ResolutionUnit values
const RESOLUTION_UNIT_INCH: u32 = 2;
const RESOLUTION_UNIT_CENTIMETER: u32 = 3;

const MICRONS_PER_INCH: f64 = 25_400.0;
const MICRONS_PER_CENTIMETER: f64 = 10_000.0;

/// Fill value for tiles the file leaves empty
const BLANK_TILE_VALUE: u8 = 255;

#[derive(Debug, Clone)]
struct LevelData {
    level: PyramidLevel,
    tile_data: TileData,
}

/// Descriptive tags read from the first IFD.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptiveTags {
    pub image_description: Option<String>,
    pub x_resolution: Option<f64>,
    pub y_resolution: Option<f64>,
    pub resolution_unit: Option<u32>,
    pub software: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub date_time: Option<String>,
}

impl DescriptiveTags {
    /// Read the descriptive tags of `ifd`.
    ///
    /// A tag that cannot be read is logged and left unset.
    async fn read<R: RangeReader>(reader: &R, header: &TiffHeader, ifd: &Ifd) -> Self {
        let values = ValueReader::new(reader, header);

        let resolution_unit = match ifd.get_entry_by_tag(TiffTag::ResolutionUnit) {
            Some(entry) => readable(TiffTag::ResolutionUnit, values.read_u32(entry).await),
            None => None,
        };

        DescriptiveTags {
            image_description: string_tag(&values, ifd, TiffTag::ImageDescription).await,
            x_resolution: rational_tag(&values, ifd, TiffTag::XResolution).await,
            y_resolution: rational_tag(&values, ifd, TiffTag::YResolution).await,
            resolution_unit,
            software: string_tag(&values, ifd, TiffTag::Software).await,
            make: string_tag(&values, ifd, TiffTag::Make).await,
            model: string_tag(&values, ifd, TiffTag::Model).await,
            date_time: string_tag(&values, ifd, TiffTag::DateTime).await,
        }
    }

    /// Microns per pixel for a resolution value, when the unit is physical.
    fn microns_per_pixel(&self, resolution: Option<f64>) -> Option<f64> {
        let resolution = resolution.filter(|r| *r > 0.0)?;
        match self.resolution_unit? {
            RESOLUTION_UNIT_CENTIMETER => Some(MICRONS_PER_CENTIMETER / resolution),
            RESOLUTION_UNIT_INCH => Some(MICRONS_PER_INCH / resolution),
            _ => None,
        }
    }

    pub fn mpp_x(&self) -> Option<f64> {
        self.microns_per_pixel(self.x_resolution)
    }

    pub fn mpp_y(&self) -> Option<f64> {
        self.microns_per_pixel(self.y_resolution)
    }

    fn to_section(&self) -> Value {
        let mut section = Map::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                section.insert(key.to_string(), Value::String(v));
            }
        };

        put(
            TiffTag::ImageDescription.metadata_name(),
            self.image_description.clone(),
        );
        put(
            TiffTag::XResolution.metadata_name(),
            self.x_resolution.map(|v| v.to_string()),
        );
        put(
            TiffTag::YResolution.metadata_name(),
            self.y_resolution.map(|v| v.to_string()),
        );
        put(
            TiffTag::ResolutionUnit.metadata_name(),
            self.resolution_unit.map(|u| match u {
                RESOLUTION_UNIT_INCH => "inch".to_string(),
                RESOLUTION_UNIT_CENTIMETER => "centimeter".to_string(),
                _ => "none".to_string(),
            }),
        );
        put("resolution-x", self.mpp_x().map(|v| v.to_string()));
        put("resolution-y", self.mpp_y().map(|v| v.to_string()));
        put(TiffTag::Software.metadata_name(), self.software.clone());
        put(TiffTag::Make.metadata_name(), self.make.clone());
        put(TiffTag::Model.metadata_name(), self.model.clone());
        put(TiffTag::DateTime.metadata_name(), self.date_time.clone());

        Value::Object(section)
    }
}

fn readable<T>(tag: TiffTag, value: Result<T, TiffError>) -> Option<T> {
    match value {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(tag = ?tag, error = %e, "Ignoring unreadable descriptive tag");
            None
        }
    }
}

async fn string_tag<R: RangeReader>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Option<String> {
    let entry = ifd.get_entry_by_tag(tag)?;
    readable(tag, values.read_string(entry).await)
}

async fn rational_tag<R: RangeReader>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Option<f64> {
    let entry = ifd.get_entry_by_tag(tag)?;
    readable(tag, values.read_rational(entry).await)
}

/// Build the properties document from what was read at open time.
fn build_properties(
    format: SlideFormat,
    tags: &DescriptiveTags,
    aperio: Option<&AperioDescription>,
    levels: &[LevelInfo],
) -> Value {
    let mut document = Map::new();
    document.insert("tiff".to_string(), tags.to_section());

    let mut openslide = Map::new();
    openslide.insert("vendor".to_string(), json!(format.vendor()));
    openslide.insert("level-count".to_string(), json!(levels.len().to_string()));

    let mpp = aperio
        .and_then(|a| a.mpp().map(|m| (m, m)))
        .or_else(|| tags.mpp_x().zip(tags.mpp_y()));
    if let Some((mpp_x, mpp_y)) = mpp {
        openslide.insert("mpp-x".to_string(), json!(mpp_x.to_string()));
        openslide.insert("mpp-y".to_string(), json!(mpp_y.to_string()));
    }

    if let Some(aperio) = aperio {
        if let Some(mag) = aperio.app_mag() {
            openslide.insert("objective-power".to_string(), json!(mag.to_string()));
        }
        document.insert("aperio".to_string(), aperio.to_section());
    }
    document.insert("openslide".to_string(), Value::Object(openslide));

    document.insert(
        "resolutions".to_string(),
        json!({
            "level_count": levels.len(),
            "level_dimensions": levels.iter().map(|l| [l.width, l.height]).collect::<Vec<_>>(),
            "level_downsamples": levels.iter().map(|l| l.downsample).collect::<Vec<_>>(),
            "level_tile_sizes": levels
                .iter()
                .map(|l| [l.tile_width, l.tile_height])
                .collect::<Vec<_>>(),
        }),
    );

    Value::Object(document)
}

/// An opened TIFF-based slide.
pub struct TiffSlide<R: RangeReader> {
    reader: R,
    format: SlideFormat,
    header: TiffHeader,
    levels: Vec<LevelData>,
    properties: Value,
}

impl<R: RangeReader> TiffSlide<R> {
    /// Parse the slide structure and metadata.
    ///
    /// Returns [`FormatError::UnsupportedFormat`] for non-TIFF input and for
    /// TIFFs without any tiled level.
    pub async fn open(reader: R) -> Result<Self, FormatError> {
        let head_len = (reader.size() as usize).min(BIGTIFF_HEADER_SIZE);
        let head = reader.read_exact_at(0, head_len).await?;
        if !is_tiff_header(&head) {
            return Err(FormatError::UnsupportedFormat {
                reason: format!("{} is not a TIFF file", reader.identifier()),
            });
        }

        let pyramid = TiffPyramid::parse(&reader).await?;
        if pyramid.levels.is_empty() {
            return Err(FormatError::UnsupportedFormat {
                reason: format!("{} has no tiled pyramid levels", reader.identifier()),
            });
        }

        let mut levels = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            let tile_data = TileData::load(&reader, level, &pyramid.header).await?;
            levels.push(LevelData {
                level: level.clone(),
                tile_data,
            });
        }

        let tags = match pyramid.first_ifd() {
            Some(ifd) => DescriptiveTags::read(&reader, &pyramid.header, ifd).await,
            None => DescriptiveTags::default(),
        };
        let format = SlideFormat::from_description(tags.image_description.as_deref());
        let aperio = match format {
            SlideFormat::AperioSvs => tags.image_description.as_deref().map(AperioDescription::parse),
            SlideFormat::GenericTiff => None,
        };

        let infos: Vec<LevelInfo> = levels.iter().map(|l| level_info(&l.level)).collect();
        let properties = build_properties(format, &tags, aperio.as_ref(), &infos);

        info!(
            source = reader.identifier(),
            format = format.name(),
            levels = levels.len(),
            width = levels[0].level.width,
            height = levels[0].level.height,
            "opened slide"
        );

        Ok(TiffSlide {
            reader,
            format,
            header: pyramid.header,
            levels,
            properties,
        })
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    fn level_data(&self, level: usize) -> Result<&LevelData, TiffError> {
        self.levels.get(level).ok_or_else(|| TiffError::InvalidTagValue {
            tag: "level",
            message: format!("level {} out of range (count {})", level, self.levels.len()),
        })
    }

    /// Raw bytes of a tile as stored in the file.
    pub async fn read_raw_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<bytes::Bytes, TiffError> {
        let data = self.level_data(level)?;
        let (offset, size) = data
            .level
            .tile_index(tile_x, tile_y)
            .and_then(|i| data.tile_data.get_tile_location(i))
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "tile",
                message: format!(
                    "tile ({}, {}) out of range for level {}",
                    tile_x, tile_y, level
                ),
            })?;

        Ok(self.reader.read_exact_at(offset, size as usize).await?)
    }
}

fn level_info(level: &PyramidLevel) -> LevelInfo {
    LevelInfo {
        width: level.width,
        height: level.height,
        tile_width: level.tile_width,
        tile_height: level.tile_height,
        tiles_x: level.tiles_x,
        tiles_y: level.tiles_y,
        downsample: level.downsample,
    }
}

#[async_trait]
impl<R: RangeReader> SlideReader for TiffSlide<R> {
    fn format(&self) -> SlideFormat {
        self.format
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.levels.get(level).map(|l| level_info(&l.level))
    }

    fn properties(&self) -> &Value {
        &self.properties
    }

    async fn read_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RgbImage, TiffError> {
        let data = self.level_data(level)?;
        let pyramid_level = &data.level;

        match Compression::from_u16(pyramid_level.compression) {
            Some(Compression::Jpeg) => {}
            _ => {
                return Err(TiffError::UnsupportedCompression(compression_name(
                    pyramid_level.compression,
                )))
            }
        }

        let raw = self.read_raw_tile(level, tile_x, tile_y).await?;
        if raw.is_empty() {
            debug!(level, tile_x, tile_y, "empty tile, filling blank");
            return Ok(RgbImage::from_pixel(
                pyramid_level.tile_width,
                pyramid_level.tile_height,
                Rgb([BLANK_TILE_VALUE; 3]),
            ));
        }

        let rgb = pyramid_level.photometric == Some(PHOTOMETRIC_RGB);
        let stream = prepare_tile_jpeg(data.tile_data.jpeg_tables.as_deref(), &raw, rgb);
        decode_jpeg(&stream)
    }
}
