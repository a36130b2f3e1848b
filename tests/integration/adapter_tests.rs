//! SlideAdapter tests over slide files written to disk.

use image::Rgb;

use wsi_reader::slide::{Device, MppKeys, ReadAs, RegionOutput, SlideAdapter, SlideOptions};
use wsi_reader::{SlideError, SlideFormat};

use super::test_utils::{aperio_description, close_to, tile_colour, PyramidBuilder};

const LEVEL0: Rgb<u8> = Rgb([200, 40, 40]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

#[tokio::test]
async fn test_aperio_slide_end_to_end() {
    let file = PyramidBuilder::standard()
        .with_jpeg_tables(true)
        .with_description(aperio_description(0.499, 20))
        .build_file(".svs");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    assert!(!adapter.is_initialized());
    assert_eq!(adapter.extension().as_deref(), Some(".svs"));

    assert_eq!(adapter.get_dimensions().await.unwrap(), (1024, 768));
    assert!(adapter.is_initialized());
    assert_eq!(adapter.level_count().await.unwrap(), 3);
    assert_eq!(
        adapter.level_dimensions().await.unwrap(),
        &[(1024, 768), (256, 192), (64, 48)]
    );
    assert_eq!(adapter.level_downsamples().await.unwrap(), &[1.0, 4.0, 16.0]);
    assert_eq!(adapter.mpp().await.unwrap(), Some(0.499));
    assert_eq!(adapter.mag().await.unwrap(), Some(20.0));

    let handle = adapter.initialize().await.unwrap();
    assert_eq!(handle.reader().format(), SlideFormat::AperioSvs);
}

#[tokio::test]
async fn test_tiff_resolution_calibration() {
    let file = PyramidBuilder::standard()
        .with_resolution(40000.0, 40000.0, 3)
        .build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    assert_eq!(adapter.mpp().await.unwrap(), Some(0.25));
    assert_eq!(adapter.mag().await.unwrap(), Some(40.0));
}

#[tokio::test]
async fn test_uncalibrated_slide() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    assert_eq!(adapter.mpp().await.unwrap(), None);
    assert_eq!(adapter.mag().await.unwrap(), None);
    assert_eq!(
        adapter.resolve_calibration(&MppKeys::default()).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_zero_denominator_resolution_opens_uncalibrated() {
    let file = PyramidBuilder::standard()
        .with_resolution_fraction((0, 0), (40000, 1), 3)
        .build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    assert_eq!(adapter.get_dimensions().await.unwrap(), (1024, 768));
    // only the y axis resolves and is mirrored
    assert_eq!(adapter.properties().await.unwrap()["tiff"]["resolution-y"], "0.25");
    assert_eq!(adapter.mpp().await.unwrap(), Some(0.25));
}

#[tokio::test]
async fn test_explicit_values_override_metadata() {
    let file = PyramidBuilder::standard()
        .with_description(aperio_description(0.499, 20))
        .build_file(".svs");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()).with_mpp(0.25));

    assert_eq!(adapter.mpp().await.unwrap(), Some(0.25));
    assert_eq!(adapter.mag().await.unwrap(), Some(40.0));

    // metadata lookups still see the file's own calibration
    assert_eq!(
        adapter.resolve_calibration(&MppKeys::default()).await.unwrap(),
        Some(0.499)
    );
}

#[tokio::test]
async fn test_custom_mpp_keys() {
    let file = PyramidBuilder::standard()
        .with_description(aperio_description(0.499, 20))
        .with_resolution(40000.0, 40000.0, 3)
        .build_file(".svs");
    let keys = MppKeys::new("tiff.resolution-x", "tiff.resolution-y");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()).with_mpp_keys(keys));

    assert_eq!(adapter.mpp().await.unwrap(), Some(0.25));
}

#[tokio::test]
async fn test_region_representations_agree() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    let image = adapter
        .read_region((100, 50), 0, (64, 32), Device::Cpu, ReadAs::Pil)
        .await
        .unwrap()
        .into_image()
        .unwrap();
    let array = adapter
        .read_region((100, 50), 0, (64, 32), Device::Cpu, ReadAs::Numpy)
        .await
        .unwrap()
        .into_array()
        .unwrap();
    let tensor = adapter
        .read_region((100, 50), 0, (64, 32), Device::Cuda(0), ReadAs::Torch)
        .await
        .unwrap()
        .into_tensor()
        .unwrap();

    assert_eq!(image.dimensions(), (64, 32));
    assert_eq!(array.shape(), &[32, 64, 3]);
    assert_eq!(tensor.shape(), &[32, 64, 3]);
    assert_eq!(tensor.device(), Device::Cuda(0));

    for (x, y) in [(0u32, 0u32), (10, 20), (63, 31)] {
        let pixel = image.get_pixel(x, y);
        for c in 0..3 {
            assert_eq!(array[[y as usize, x as usize, c]], pixel[c]);
            assert_eq!(tensor.data()[[y as usize, x as usize, c]], pixel[c]);
        }
    }
}

#[tokio::test]
async fn test_region_spans_tiles() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    // 120..376 crosses tile columns 0, 1 and 2 on level 0
    let image = adapter
        .read_region((120, 120), 0, (256, 16), Device::Cpu, ReadAs::Pil)
        .await
        .unwrap()
        .to_image();

    assert!(close_to(image.get_pixel(2, 4), tile_colour(LEVEL0, 0, 0)));
    assert!(close_to(image.get_pixel(60, 4), tile_colour(LEVEL0, 1, 0)));
    assert!(close_to(image.get_pixel(200, 12), tile_colour(LEVEL0, 2, 1)));
}

#[tokio::test]
async fn test_region_on_lower_level() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    // level-0 (640, 0) is level-1 (160, 0), inside tile column 1
    let image = adapter
        .read_region((640, 0), 1, (32, 32), Device::Cpu, ReadAs::Pil)
        .await
        .unwrap()
        .to_image();

    assert!(close_to(
        image.get_pixel(16, 16),
        tile_colour(Rgb([40, 200, 40]), 1, 0)
    ));
}

#[tokio::test]
async fn test_region_outside_slide_is_white() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    let image = adapter
        .read_region((1000, -20), 0, (48, 48), Device::Cpu, ReadAs::Pil)
        .await
        .unwrap()
        .to_image();

    assert_eq!(*image.get_pixel(10, 5), WHITE);
    assert_eq!(*image.get_pixel(40, 30), WHITE);
    assert!(close_to(image.get_pixel(10, 30), tile_colour(LEVEL0, 7, 0)));

    let far = adapter
        .read_region((5000, 5000), 0, (8, 8), Device::Cpu, ReadAs::Numpy)
        .await
        .unwrap()
        .into_array()
        .unwrap();
    assert!(far.iter().all(|v| *v == 255));
}

#[tokio::test]
async fn test_invalid_level() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    let err = adapter
        .read_region((0, 0), 3, (8, 8), Device::Cpu, ReadAs::Pil)
        .await
        .unwrap_err();
    assert!(matches!(err, SlideError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_thumbnail_exact_size() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    let thumbnail = adapter.get_thumbnail((100, 40)).await.unwrap();
    assert_eq!(thumbnail.dimensions(), (100, 40));

    // 1024x768 into 64x48 picks the smallest level
    let small = adapter.get_thumbnail((64, 48)).await.unwrap();
    assert_eq!(small.dimensions(), (64, 48));
    assert!(close_to(small.get_pixel(32, 24), Rgb([40, 40, 200])));
}

#[tokio::test]
async fn test_best_level_for_downsample() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    assert_eq!(
        adapter.best_level_and_custom_downsample(4.0).await.unwrap(),
        (1, 1.0)
    );
    assert_eq!(
        adapter.best_level_and_custom_downsample(8.0).await.unwrap(),
        (1, 2.0)
    );
    assert_eq!(
        adapter.best_level_and_custom_downsample(32.0).await.unwrap(),
        (2, 2.0)
    );
    assert!(adapter.best_level_and_custom_downsample(0.0).await.is_err());
}

#[tokio::test]
async fn test_empty_tile_reads_white() {
    let file = PyramidBuilder::standard()
        .with_empty_tile(0, 0, 0)
        .build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    let region = adapter
        .read_region((0, 0), 0, (256, 8), Device::Cpu, ReadAs::Pil)
        .await
        .unwrap()
        .to_image();
    assert_eq!(*region.get_pixel(10, 4), WHITE);
    assert!(close_to(region.get_pixel(200, 4), tile_colour(LEVEL0, 1, 0)));
}

#[tokio::test]
async fn test_unsupported_compression_on_read() {
    let file = PyramidBuilder::standard()
        .with_compression(5)
        .build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    // metadata works, pixels do not
    assert_eq!(adapter.level_count().await.unwrap(), 3);
    let err = adapter
        .read_region((0, 0), 0, (16, 16), Device::Cpu, ReadAs::Pil)
        .await
        .unwrap_err();
    assert!(matches!(err, SlideError::Read(_)));
}

#[tokio::test]
async fn test_missing_slide() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = SlideAdapter::new(SlideOptions::new(dir.path().join("absent.svs")));

    let err = adapter.get_dimensions().await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!adapter.is_initialized());
}

#[tokio::test]
async fn test_non_tiff_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.svs");
    std::fs::write(&path, b"this is not a slide, just some text").unwrap();

    let adapter = SlideAdapter::new(SlideOptions::new(&path));
    let err = adapter.get_dimensions().await.unwrap_err();
    assert!(matches!(err, SlideError::Initialization { .. }));
}

#[tokio::test]
async fn test_bad_arguments_checked_before_opening() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = SlideAdapter::new(SlideOptions::new(dir.path().join("absent.svs")));

    let err = adapter
        .read_region_as((0, 0), 0, (8, 8), "cpu", "tiff")
        .await
        .unwrap_err();
    assert!(matches!(err, SlideError::InvalidArgument(_)));

    let err = adapter
        .read_region_as((0, 0), 0, (8, 8), "tpu", "numpy")
        .await
        .unwrap_err();
    assert!(matches!(err, SlideError::InvalidArgument(_)));
    assert!(!adapter.is_initialized());
}

#[tokio::test]
async fn test_read_region_by_name() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    let output = adapter
        .read_region_as((0, 0), 2, (16, 16), "cuda:1", "torch")
        .await
        .unwrap();
    match output {
        RegionOutput::Tensor(tensor) => {
            assert_eq!(tensor.device(), Device::Cuda(1));
            assert_eq!(tensor.to_chw().shape(), &[3, 16, 16]);
        }
        other => panic!("expected a tensor, got {:?}", other.dimensions()),
    }
}

#[tokio::test]
async fn test_tissue_segmentation_loaded() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let dir = tempfile::tempdir().unwrap();
    let seg = dir.path().join("tissue.geojson");
    std::fs::write(
        &seg,
        r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"classification": "tissue"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[10, 10], [500, 10], [500, 400], [10, 400], [10, 10]]]
                    }
                }
            ]
        }"#,
    )
    .unwrap();

    let adapter = SlideAdapter::new(SlideOptions::new(file.path()).with_tissue_seg(&seg));
    let contours = adapter.tissue_contours().await.unwrap().unwrap();
    assert_eq!(contours.len(), 1);
    assert_eq!(contours[0].bounds(), Some((10.0, 10.0, 500.0, 400.0)));
}

#[tokio::test]
async fn test_missing_tissue_segmentation() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let dir = tempfile::tempdir().unwrap();

    let adapter = SlideAdapter::new(
        SlideOptions::new(file.path()).with_tissue_seg(dir.path().join("missing.geojson")),
    );
    let err = adapter.initialize().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_first_use() {
    let file = PyramidBuilder::standard().build_file(".tif");
    let adapter = SlideAdapter::new(SlideOptions::new(file.path()));

    let (a, b) = tokio::join!(adapter.get_dimensions(), adapter.level_count());
    assert_eq!(a.unwrap(), (1024, 768));
    assert_eq!(b.unwrap(), 3);
}
