//! End-to-end tests of the TIFF engine against generated slides.

use std::sync::atomic::Ordering;

use image::Rgb;

use wsi_reader::error::{FormatError, TiffError};
use wsi_reader::format::{open_local, SlideFormat, TiffSlide};
use wsi_reader::io::BlockCache;
use wsi_reader::slide::SlideReader;

use super::test_utils::{
    aperio_description, close_to, tile_colour, ByteOrderType, LevelSpec, MemoryReader,
    PyramidBuilder,
};

async fn open(builder: PyramidBuilder) -> TiffSlide<MemoryReader> {
    TiffSlide::open(MemoryReader::new(builder.build(), "mem://slide.tif"))
        .await
        .unwrap()
}

/// Read every tile's centre pixel and compare with the generated colours.
async fn assert_tiles_match(slide: &TiffSlide<MemoryReader>, level: usize, base: Rgb<u8>) {
    let info = slide.level_info(level).unwrap();
    for ty in 0..info.tiles_y {
        for tx in 0..info.tiles_x {
            let tile = slide.read_tile(level, tx, ty).await.unwrap();
            assert_eq!(tile.dimensions(), (info.tile_width, info.tile_height));
            let centre = tile.get_pixel(info.tile_width / 2, info.tile_height / 2);
            assert!(
                close_to(centre, tile_colour(base, tx, ty)),
                "tile ({}, {}) of level {}: {:?}",
                tx,
                ty,
                level,
                centre
            );
        }
    }
}

#[tokio::test]
async fn test_generic_pyramid_structure() {
    let slide = open(PyramidBuilder::standard()).await;

    assert_eq!(slide.format(), SlideFormat::GenericTiff);
    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.dimensions(), Some((1024, 768)));
    assert_eq!(slide.level_dimensions(1), Some((256, 192)));
    assert_eq!(slide.level_dimensions(2), Some((64, 48)));
    assert_eq!(slide.level_downsample(0), Some(1.0));
    assert_eq!(slide.level_downsample(1), Some(4.0));
    assert_eq!(slide.level_downsample(2), Some(16.0));
    assert_eq!(slide.tile_size(0), Some((128, 128)));

    let info = slide.level_info(0).unwrap();
    assert_eq!((info.tiles_x, info.tiles_y), (8, 6));
    assert!(slide.level_info(3).is_none());

    let props = slide.properties();
    assert_eq!(props["openslide"]["vendor"], "generic-tiff");
    assert_eq!(props["openslide"]["level-count"], "3");
    assert_eq!(props["resolutions"]["level_count"], 3);
    assert!(props.get("aperio").is_none());
}

#[tokio::test]
async fn test_tiles_decode_to_generated_colours() {
    let slide = open(PyramidBuilder::standard()).await;
    assert_tiles_match(&slide, 0, Rgb([200, 40, 40])).await;
    assert_tiles_match(&slide, 2, Rgb([40, 40, 200])).await;
}

#[tokio::test]
async fn test_big_endian_and_bigtiff() {
    for (order, bigtiff) in [
        (ByteOrderType::BigEndian, false),
        (ByteOrderType::LittleEndian, true),
        (ByteOrderType::BigEndian, true),
    ] {
        let builder = PyramidBuilder::standard()
            .with_byte_order(order)
            .with_bigtiff(bigtiff)
            .with_resolution(40000.0, 40000.0, 3);
        let slide = open(builder).await;

        assert_eq!(slide.header().is_bigtiff, bigtiff);
        assert_eq!(slide.level_count(), 3);
        assert_eq!(slide.properties()["openslide"]["mpp-x"], "0.25");
        assert_tiles_match(&slide, 1, Rgb([40, 200, 40])).await;
    }
}

#[tokio::test]
async fn test_jpeg_tables_merged() {
    let slide = open(PyramidBuilder::standard().with_jpeg_tables(true)).await;

    let raw = slide.read_raw_tile(0, 1, 1).await.unwrap();
    assert!(wsi_reader::format::jpeg::is_abbreviated_stream(&raw));

    assert_tiles_match(&slide, 0, Rgb([200, 40, 40])).await;
    assert_tiles_match(&slide, 1, Rgb([40, 200, 40])).await;
}

#[tokio::test]
async fn test_aperio_properties() {
    let builder = PyramidBuilder::standard()
        .with_jpeg_tables(true)
        .with_description(aperio_description(0.499, 20));
    let slide = open(builder).await;

    assert_eq!(slide.format(), SlideFormat::AperioSvs);

    let props = slide.properties();
    assert_eq!(props["openslide"]["vendor"], "aperio");
    assert_eq!(props["openslide"]["mpp-x"], "0.499");
    assert_eq!(props["openslide"]["mpp-y"], "0.499");
    assert_eq!(props["openslide"]["objective-power"], "20");
    assert_eq!(props["aperio"]["MPP"], "0.499");
    assert_eq!(props["aperio"]["ScanScope ID"], "SS0001");
    assert!(props["tiff"]["ImageDescription"]
        .as_str()
        .unwrap()
        .starts_with("Aperio Image Library"));
}

#[tokio::test]
async fn test_resolution_in_inches() {
    // 50800 px/inch is 0.5 um/px
    let builder = PyramidBuilder::standard()
        .with_resolution(50800.0, 50800.0, 2)
        .with_software("scanner 1.0");
    let slide = open(builder).await;

    let props = slide.properties();
    assert_eq!(props["tiff"]["resolution-x"], "0.5");
    assert_eq!(props["tiff"]["ResolutionUnit"], "inch");
    assert_eq!(props["tiff"]["Software"], "scanner 1.0");
    assert_eq!(props["openslide"]["mpp-y"], "0.5");
}

#[tokio::test]
async fn test_resolution_without_unit_is_not_calibration() {
    let slide = open(PyramidBuilder::standard().with_resolution(72.0, 72.0, 1)).await;

    let props = slide.properties();
    assert_eq!(props["tiff"]["XResolution"], "72");
    assert!(props["tiff"].get("resolution-x").is_none());
    assert!(props["openslide"].get("mpp-x").is_none());
}

#[tokio::test]
async fn test_malformed_resolution_is_skipped() {
    let builder = PyramidBuilder::standard()
        .with_resolution_fraction((0, 0), (0, 0), 3)
        .with_software("scanner 1.0");
    let slide = open(builder).await;

    assert_eq!(slide.level_count(), 3);
    let props = slide.properties();
    assert!(props["tiff"].get("XResolution").is_none());
    assert!(props["tiff"].get("resolution-x").is_none());
    assert_eq!(props["tiff"]["ResolutionUnit"], "centimeter");
    assert_eq!(props["tiff"]["Software"], "scanner 1.0");
    assert!(props["openslide"].get("mpp-x").is_none());
    assert_tiles_match(&slide, 2, Rgb([40, 40, 200])).await;
}

#[tokio::test]
async fn test_label_image_excluded() {
    let slide = open(PyramidBuilder::standard().with_label(40, 30)).await;
    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.level_dimensions(2), Some((64, 48)));
}

#[tokio::test]
async fn test_empty_tile_is_white() {
    let slide = open(PyramidBuilder::standard().with_empty_tile(0, 2, 3)).await;

    let tile = slide.read_tile(0, 2, 3).await.unwrap();
    assert_eq!(tile.dimensions(), (128, 128));
    assert!(tile.pixels().all(|p| *p == Rgb([255, 255, 255])));

    let neighbour = slide.read_tile(0, 3, 3).await.unwrap();
    assert!(close_to(
        neighbour.get_pixel(5, 5),
        tile_colour(Rgb([200, 40, 40]), 3, 3)
    ));
}

#[tokio::test]
async fn test_unsupported_compression_fails_at_decode() {
    let slide = open(PyramidBuilder::standard().with_compression(5)).await;

    // opening succeeds; reading does not
    assert_eq!(slide.level_count(), 3);
    let err = slide.read_tile(0, 0, 0).await.unwrap_err();
    assert!(matches!(err, TiffError::UnsupportedCompression(_)));
}

#[tokio::test]
async fn test_tile_out_of_range() {
    let slide = open(PyramidBuilder::standard()).await;
    assert!(slide.read_tile(0, 8, 0).await.is_err());
    assert!(slide.read_tile(5, 0, 0).await.is_err());
}

#[tokio::test]
async fn test_single_level_slide() {
    let builder = PyramidBuilder::new().with_level(LevelSpec::new(300, 200, 256, Rgb([90, 90, 90])));
    let slide = open(builder).await;

    assert_eq!(slide.level_count(), 1);
    let info = slide.level_info(0).unwrap();
    assert_eq!((info.tiles_x, info.tiles_y), (2, 1));
    assert_tiles_match(&slide, 0, Rgb([90, 90, 90])).await;
}

#[tokio::test]
async fn test_non_tiff_rejected() {
    let result = TiffSlide::open(MemoryReader::new(b"GIF89a not a tiff".to_vec(), "mem://x")).await;
    assert!(matches!(
        result,
        Err(FormatError::UnsupportedFormat { .. })
    ));

    let result = TiffSlide::open(MemoryReader::new(vec![0x49, 0x49], "mem://tiny")).await;
    assert!(matches!(
        result,
        Err(FormatError::UnsupportedFormat { .. })
    ));
}

#[tokio::test]
async fn test_block_cache_limits_requests() {
    let data = PyramidBuilder::standard().build();

    let direct = MemoryReader::new(data.clone(), "mem://direct");
    let direct_count = direct.counter();
    let slide = TiffSlide::open(direct).await.unwrap();
    slide.read_tile(0, 0, 0).await.unwrap();
    slide.read_tile(0, 0, 0).await.unwrap();

    let cached = MemoryReader::new(data, "mem://cached");
    let cached_count = cached.counter();
    let slide = TiffSlide::open(BlockCache::with_capacity(cached, 64 * 1024, 32))
        .await
        .unwrap();
    slide.read_tile(0, 0, 0).await.unwrap();
    slide.read_tile(0, 0, 0).await.unwrap();

    assert!(cached_count.load(Ordering::SeqCst) < direct_count.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_open_local_file() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let slide = open_local(file.path(), 4096, 16).await.unwrap();

    assert_eq!(slide.dimensions(), Some((1024, 768)));
    let tile = slide.read_tile(1, 1, 0).await.unwrap();
    assert!(close_to(
        tile.get_pixel(64, 64),
        tile_colour(Rgb([40, 200, 40]), 1, 0)
    ));
}

#[tokio::test]
async fn test_open_local_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = open_local(dir.path().join("missing.tif"), 4096, 16)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, FormatError::Io(_)));
}
