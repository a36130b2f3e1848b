//! Calibration lookup over vendor metadata.
//!
//! Slide properties arrive as a nested JSON document whose layout depends on
//! the vendor. Lookups run against a flattened view where nested object keys
//! are joined with `.` and lowercased, e.g. `{"openslide": {"mpp-x": "0.25"}}`
//! becomes `openslide.mpp-x`. Arrays are leaves and are never indexed.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::SlideError;

/// Keys tried, in order, when looking up microns per pixel.
pub const FALLBACK_MPP_KEYS: &[&str] = &[
    "openslide.mpp-x",
    "openslide.mpp-y",
    "tiff.resolution-x",
    "tiff.resolution-y",
    "mpp",
    "spacing",
    "microns_per_pixel",
    "aperio.mpp",
    "hamamatsu.mpp",
    "metadata.resolutions.level[0].spacing",
    "metadata.resolutions.level[0].physical_size.0",
];

/// Keys holding the scanner's objective power.
pub const OBJECTIVE_POWER_KEYS: &[&str] = &["openslide.objective-power", "aperio.appmag"];

/// Upper mpp bounds and the magnification they map to.
const MAGNIFICATION_THRESHOLDS: &[(f64, f64)] = &[
    (0.16, 80.0),
    (0.2, 60.0),
    (0.3, 40.0),
    (0.6, 20.0),
    (1.2, 10.0),
    (2.4, 5.0),
];

/// Tolerance for treating a level downsample as an exact match.
const DOWNSAMPLE_TOLERANCE: f64 = 0.01;

/// Caller-supplied metadata keys checked before [`FALLBACK_MPP_KEYS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MppKeys {
    pub mpp_x: Option<String>,
    pub mpp_y: Option<String>,
}

impl MppKeys {
    pub fn new(mpp_x: impl Into<String>, mpp_y: impl Into<String>) -> Self {
        MppKeys {
            mpp_x: Some(mpp_x.into()),
            mpp_y: Some(mpp_y.into()),
        }
    }
}

/// Flatten a nested metadata document into lowercase dotted keys.
///
/// A non-object document flattens to an empty map.
pub fn flatten(metadata: &Value) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    if let Value::Object(map) = metadata {
        for (key, value) in map {
            flatten_into(&mut flat, key, value);
        }
    }
    flat
}

fn flatten_into(flat: &mut BTreeMap<String, Value>, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (child, value) in map {
                flatten_into(flat, &format!("{key}.{child}"), value);
            }
        }
        _ => {
            flat.insert(key.to_lowercase(), value.clone());
        }
    }
}

/// Read a metadata value as a float.
///
/// Numbers and numeric strings parse; everything else is absent.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lookup(flat: &BTreeMap<String, Value>, key: Option<&str>) -> Option<f64> {
    flat.get(&key?.to_lowercase()).and_then(parse_number)
}

/// Microns per pixel averaged over both axes.
///
/// Custom keys are consulted first. The fallback walk fills whichever axis is
/// still empty from the next key present in the document, x before y, so
/// `openslide.mpp-x` and `openslide.mpp-y` land on their own axes. A key that
/// is present but does not parse still consumes its turn. A single resolved
/// axis is mirrored to the other.
pub fn resolve_calibration(metadata: &Value, custom_keys: &MppKeys) -> Option<f64> {
    let flat = flatten(metadata);

    let mut mpp_x = lookup(&flat, custom_keys.mpp_x.as_deref());
    let mut mpp_y = lookup(&flat, custom_keys.mpp_y.as_deref());

    for key in FALLBACK_MPP_KEYS {
        if mpp_x.is_none() && flat.contains_key(*key) {
            mpp_x = flat.get(*key).and_then(parse_number);
        } else if mpp_y.is_none() && flat.contains_key(*key) {
            mpp_y = flat.get(*key).and_then(parse_number);
        }
        if mpp_x.is_some() && mpp_y.is_some() {
            break;
        }
    }

    match (mpp_x, mpp_y) {
        (Some(x), Some(y)) => Some((x + y) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Nominal objective magnification for a microns-per-pixel value.
///
/// Returns `None` for non-positive values and for mpp of 2.4 and above.
pub fn magnification_from_mpp(mpp: f64) -> Option<f64> {
    if mpp.is_nan() || mpp <= 0.0 {
        return None;
    }
    MAGNIFICATION_THRESHOLDS
        .iter()
        .find(|(bound, _)| mpp < *bound)
        .map(|(_, mag)| *mag)
}

/// Magnification from calibration, else from the objective-power keys.
pub fn resolve_magnification(
    metadata: &Value,
    mpp: Option<f64>,
    custom_keys: &MppKeys,
) -> Option<f64> {
    let mpp = mpp.or_else(|| resolve_calibration(metadata, custom_keys));
    if let Some(mag) = mpp.and_then(magnification_from_mpp) {
        return Some(mag);
    }

    let flat = flatten(metadata);
    OBJECTIVE_POWER_KEYS
        .iter()
        .filter_map(|key| flat.get(*key).and_then(parse_number))
        .find(|mag| *mag > 0.0)
}

/// Pick the pyramid level for a target downsample.
///
/// Returns the level and the residual scale still to apply to it. An exact
/// match (within 0.01) needs no residual. When downsampling, the deepest level
/// not exceeding the target is used and the residual is `target / level`.
/// When upsampling, the first level at or above the target is used and the
/// residual is `level / target`.
pub fn best_level_and_custom_downsample(
    level_downsamples: &[f64],
    downsample: f64,
) -> Result<(usize, f64), SlideError> {
    if !downsample.is_finite() || downsample <= 0.0 {
        return Err(SlideError::InvalidArgument(format!(
            "downsample must be a positive number, got {downsample}"
        )));
    }

    if let Some(level) = level_downsamples
        .iter()
        .position(|d| (d - downsample).abs() <= DOWNSAMPLE_TOLERANCE)
    {
        return Ok((level, 1.0));
    }

    if downsample >= 1.0 {
        let best = level_downsamples
            .iter()
            .enumerate()
            .filter(|(_, d)| **d <= downsample)
            .last();
        if let Some((level, d)) = best {
            return Ok((level, downsample / d));
        }
    } else if let Some((level, d)) = level_downsamples
        .iter()
        .enumerate()
        .find(|(_, d)| **d >= downsample)
    {
        return Ok((level, d / downsample));
    }

    Err(SlideError::InvalidArgument(format!(
        "no pyramid level suits downsample {downsample}"
    )))
}
