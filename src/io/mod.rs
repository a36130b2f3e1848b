//! Byte-source layer for slide files.
//!
//! Everything above this module reads slides through [`RangeReader`], so the
//! TIFF engine never touches the filesystem directly. [`LocalFileReader`]
//! serves bytes from disk and [`BlockCache`] sits in front of it to turn the
//! many small header/IFD reads into a handful of block reads.

mod block_cache;
mod file_reader;
pub(crate) mod range_reader;

pub use block_cache::{BlockCache, CacheStats, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use file_reader::LocalFileReader;
pub use range_reader::RangeReader;
