//! # Metadata Header
//!
//! The first `METADATA_LENGTH` bytes of every data file. Layout
//! (little-endian):
//!
//! ```text
//! Offset            Size           Description
//! 0                 4              Schema text length
//! 4                 schema_length  Canonical schema text
//! 4+schema_length   4              Frame size
//! 8+schema_length   4              Frame count
//! 12+schema_length  4              Element count
//! ...               ...            Padding up to METADATA_LENGTH
//! ```
//!
//! Decoding validates every field it can without the schema's row size;
//! the table layers the remaining checks (frame capacity, schema equality)
//! on top.

use eyre::Result;

use crate::config::{MAX_FRAME_SIZE, METADATA_FIXED_OVERHEAD, METADATA_LENGTH, MIN_FRAME_SIZE};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub schema_text: String,
    pub frame_size: u32,
    pub frame_count: u32,
    pub element_count: u32,
}

impl TableMeta {
    pub fn encode(&self) -> Result<[u8; METADATA_LENGTH]> {
        let schema = self.schema_text.as_bytes();
        if schema.len() + METADATA_FIXED_OVERHEAD > METADATA_LENGTH {
            return Err(StoreError::TooBigRow(format!(
                "schema text of {} bytes does not fit the {METADATA_LENGTH}-byte metadata header",
                schema.len()
            ))
            .into());
        }

        let mut buf = [0u8; METADATA_LENGTH];
        let mut at = 0;
        buf[at..at + 4].copy_from_slice(&(schema.len() as u32).to_le_bytes());
        at += 4;
        buf[at..at + schema.len()].copy_from_slice(schema);
        at += schema.len();
        buf[at..at + 4].copy_from_slice(&self.frame_size.to_le_bytes());
        at += 4;
        buf[at..at + 4].copy_from_slice(&self.frame_count.to_le_bytes());
        at += 4;
        buf[at..at + 4].copy_from_slice(&self.element_count.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8; METADATA_LENGTH]) -> Result<Self> {
        let schema_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if schema_len == 0 {
            return Err(StoreError::Corruption("metadata schema length is zero".into()).into());
        }
        if schema_len + METADATA_FIXED_OVERHEAD > METADATA_LENGTH {
            return Err(StoreError::Corruption(format!(
                "metadata schema length {schema_len} exceeds the header"
            ))
            .into());
        }

        let mut at = 4;
        let schema_text = std::str::from_utf8(&buf[at..at + schema_len])
            .map_err(|_| StoreError::Corruption("metadata schema text is not UTF-8".into()))?
            .to_string();
        at += schema_len;

        let frame_size = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        at += 4;
        if (frame_size as usize) < MIN_FRAME_SIZE {
            return Err(
                StoreError::Corruption(format!("frame size {frame_size} below minimum")).into(),
            );
        }
        if (frame_size as usize) >= MAX_FRAME_SIZE {
            return Err(
                StoreError::Corruption(format!("frame size {frame_size} above maximum")).into(),
            );
        }

        let frame_count = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        at += 4;
        let element_count = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(Self {
            schema_text,
            frame_size,
            frame_count,
            element_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let meta = TableMeta {
            schema_text: "|id:INT32|name:STRING|price:FLOAT32|".into(),
            frame_size: 4096,
            frame_count: 2,
            element_count: 205,
        };
        let buf = meta.encode().unwrap();
        assert_eq!(TableMeta::decode(&buf).unwrap(), meta);
    }

    #[test]
    fn test_oversized_schema_rejected_on_encode() {
        let meta = TableMeta {
            schema_text: "x".repeat(METADATA_LENGTH),
            frame_size: 4096,
            frame_count: 0,
            element_count: 0,
        };
        let err = meta.encode().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::TooBigRow(_))
        ));
    }

    #[test]
    fn test_zero_schema_length_is_corruption() {
        let buf = [0u8; METADATA_LENGTH];
        let err = TableMeta::decode(&buf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn test_out_of_range_frame_size_is_corruption() {
        let mut meta = TableMeta {
            schema_text: "|id:INT32|".into(),
            frame_size: 16,
            frame_count: 0,
            element_count: 0,
        };
        let buf = meta.encode().unwrap();
        assert!(TableMeta::decode(&buf).is_err());

        meta.frame_size = (MAX_FRAME_SIZE as u32) * 2;
        let buf = meta.encode().unwrap();
        assert!(TableMeta::decode(&buf).is_err());
    }
}
