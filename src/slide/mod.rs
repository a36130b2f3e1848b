//! Slide access layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              SlideAdapter               │
//! │ (lazy open, calibration, thumbnails,    │
//! │  region reads, tissue contours)         │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader trait             │
//! │  (levels, properties, decoded tiles)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        TiffSlide (format module)        │
//! └─────────────────────────────────────────┘
//! ```

mod adapter;
pub mod contours;
pub mod metadata;
mod reader;
pub mod region;

pub use adapter::{SlideAdapter, SlideHandle, SlideOptions};
pub use contours::TissueContour;
pub use metadata::MppKeys;
pub use reader::{LevelInfo, SlideReader};
pub use region::{Device, ReadAs, RegionOutput, Tensor};
