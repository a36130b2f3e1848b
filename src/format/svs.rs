//! Aperio SVS ImageDescription parsing.
//!
//! Aperio writes its scan metadata into the ImageDescription of the first
//! IFD as a single string:
//!
//! ```text
//! Aperio Image Library v12.0.15
//! 46920x33600 [0,100 46000x32893] (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499|...
//! ```
//!
//! The leading segment describes the image; every following `|`-separated
//! segment is a `key = value` pair. Keys keep their original spelling.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Key/value content of an Aperio ImageDescription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AperioDescription {
    /// Text before the first `|`
    pub header: String,

    /// `key = value` segments in key order
    pub properties: BTreeMap<String, String>,
}

impl AperioDescription {
    pub fn parse(description: &str) -> Self {
        let mut segments = description.split('|');
        let header = segments.next().unwrap_or_default().trim().to_string();

        let properties = segments
            .filter_map(|segment| {
                let (key, value) = segment.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();

        AperioDescription { header, properties }
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.properties.get(key)?.parse().ok()
    }

    /// Microns per pixel from the `MPP` key.
    pub fn mpp(&self) -> Option<f64> {
        self.number("MPP").filter(|v| *v > 0.0)
    }

    /// Objective magnification from the `AppMag` key.
    pub fn app_mag(&self) -> Option<f64> {
        self.number("AppMag").filter(|v| *v > 0.0)
    }

    /// The `aperio` section of the properties document.
    pub fn to_section(&self) -> Value {
        let mut section: Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if !self.header.is_empty() {
            section.insert("Header".to_string(), Value::String(self.header.clone()));
        }
        Value::Object(section)
    }
}
