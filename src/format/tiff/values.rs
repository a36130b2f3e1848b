//! Tag value decoding.
//!
//! Small values live inside the IFD entry; anything larger sits at an offset
//! and is fetched with one range read per tag, so whole TileOffsets arrays
//! come back in a single request.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads entry values through a [`RangeReader`] using the header's layout.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw value bytes, inline or fetched from the entry's offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let offset = entry.value_offset(self.header.byte_order);
        Ok(self.reader.read_exact_at(offset, size as usize).await?)
    }

    /// A single unsigned value of any integer type.
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        if entry.count != 1 {
            return Err(invalid_count(entry));
        }
        self.read_u64_array(entry)
            .await?
            .first()
            .copied()
            .ok_or_else(|| invalid_count(entry))
    }

    pub async fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        let value = self.read_u64(entry).await?;
        u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
            tag: "u32",
            message: format!("tag {} value {} exceeds 32 bits", entry.tag_id, value),
        })
    }

    /// Every value of a SHORT, LONG or LONG8 entry, widened to u64.
    ///
    /// Used for TileOffsets and TileByteCounts.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        parse_unsigned(&bytes, entry.count as usize, field_type, self.byte_order()).ok_or_else(
            || TiffError::InvalidTagValue {
                tag: "integer array",
                message: format!(
                    "tag {} has type {:?}, expected Short, Long or Long8",
                    entry.tag_id, field_type
                ),
            },
        )
    }

    /// NUL-terminated ASCII value; bytes after the first NUL are dropped.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "string",
                message: format!(
                    "tag {} has type {}, expected Ascii",
                    entry.tag_id, entry.field_type_raw
                ),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// First value of a RATIONAL entry as a float.
    ///
    /// SHORT and LONG entries are accepted too; some writers store
    /// XResolution as a plain integer.
    pub async fn read_rational(&self, entry: &IfdEntry) -> Result<f64, TiffError> {
        match entry.field_type {
            Some(FieldType::Rational) => {
                let bytes = self.read_bytes(entry).await?;
                if bytes.len() < 8 {
                    return Err(invalid_count(entry));
                }
                let order = self.byte_order();
                let numerator = order.read_u32(&bytes[0..4]);
                let denominator = order.read_u32(&bytes[4..8]);
                if denominator == 0 {
                    return Err(TiffError::InvalidTagValue {
                        tag: "rational",
                        message: format!("tag {} has a zero denominator", entry.tag_id),
                    });
                }
                Ok(numerator as f64 / denominator as f64)
            }
            _ => Ok(self.read_u64(entry).await? as f64),
        }
    }
}

fn invalid_count(entry: &IfdEntry) -> TiffError {
    TiffError::InvalidTagValue {
        tag: "scalar",
        message: format!("tag {} has count {}, expected 1", entry.tag_id, entry.count),
    }
}

/// Decode `count` unsigned integers from `bytes`.
///
/// Returns `None` for non-integer field types. Values past the end of a
/// short buffer are skipped.
pub fn parse_unsigned(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Option<Vec<u64>> {
    let width = match field_type {
        FieldType::Short | FieldType::Long | FieldType::Long8 => field_type.size_in_bytes(),
        _ => return None,
    };

    let values = bytes
        .chunks_exact(width)
        .take(count)
        .map(|chunk| match field_type {
            FieldType::Short => byte_order.read_u16(chunk) as u64,
            FieldType::Long => byte_order.read_u32(chunk) as u64,
            _ => byte_order.read_u64(chunk),
        })
        .collect();

    Some(values)
}
