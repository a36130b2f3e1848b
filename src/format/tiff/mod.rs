//! TIFF and BigTIFF structure parsing.
//!
//! - **Byte order**: declared by the header (`II` or `MM`); every multi-byte
//!   value is read through [`ByteOrder`].
//! - **Classic vs BigTIFF**: 32-bit vs 64-bit offsets and counts. The header
//!   records which one applies and the IFD parser follows it.
//! - **IFDs**: one per image in the file. Slides keep pyramid levels, a
//!   thumbnail, a label and a macro image in separate IFDs.
//! - **Inline vs offset values**: values that fit in the entry's value field
//!   are stored there; larger ones sit at an offset.

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData, PHOTOMETRIC_RGB, PHOTOMETRIC_YCBCR};
pub use tags::{compression_name, Compression, FieldType, TiffTag};
pub use values::{parse_unsigned, ValueReader};
