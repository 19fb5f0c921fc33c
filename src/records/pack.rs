//! # Row Packing
//!
//! Conversions between row representations and the packed on-disk form.
//! Three paths share the schema's derived tables:
//!
//! - [`Schema::pack_row`] / [`Schema::unpack_row`]: the dynamic [`Row`]
//!   form. String slots are written as `(length, 0)`; the table patches the
//!   offset after handing the payload to the strings heap, and unpacking
//!   resolves payloads through a caller-supplied fetch closure so this
//!   module never touches the heap directly.
//! - [`Schema::pack_padded`] / [`Schema::unpack_padded`]: buffer-level
//!   bijection between the naturally aligned padded image and the packed
//!   row. Rejected for schemas with string columns.
//! - [`Schema::pack_record`] / [`Schema::unpack_record`]: typed wrappers
//!   moving `#[repr(C)]` zerocopy records through the padded bijection.
//!
//! All integers and floats are little-endian on disk.

use eyre::Result;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::error::StoreError;

use super::row::{Row, Value};
use super::schema::Schema;
use super::types::{Column, DataType};

const EMPTY: &[u8] = &[];

fn read_u32(src: &[u8], off: usize) -> u32 {
    let bytes: [u8; 4] = src[off..off + 4]
        .try_into()
        .expect("slice bounds checked by caller"); // INVARIANT: callers verify buffer length first
    u32::from_le_bytes(bytes)
}

fn read_u64(src: &[u8], off: usize) -> u64 {
    let bytes: [u8; 8] = src[off..off + 8]
        .try_into()
        .expect("slice bounds checked by caller"); // INVARIANT: callers verify buffer length first
    u64::from_le_bytes(bytes)
}

fn write_u32(dst: &mut [u8], off: usize, v: u32) {
    dst[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn write_u64(dst: &mut [u8], off: usize, v: u64) {
    dst[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn encode_scalar(col: &Column, value: &Value, dst: &mut [u8]) -> Result<()> {
    match (col.data_type, value) {
        (DataType::Char, Value::Char(v)) => dst[0] = *v,
        (DataType::WChar, Value::WChar(v)) => dst[..2].copy_from_slice(&v.to_le_bytes()),
        (DataType::Int8, Value::Int8(v)) => dst[0] = *v as u8,
        (DataType::Int16, Value::Int16(v)) => dst[..2].copy_from_slice(&v.to_le_bytes()),
        (DataType::Int32, Value::Int32(v)) => dst[..4].copy_from_slice(&v.to_le_bytes()),
        (DataType::Int64, Value::Int64(v)) => dst[..8].copy_from_slice(&v.to_le_bytes()),
        (DataType::Float32, Value::Float32(v)) => dst[..4].copy_from_slice(&v.to_le_bytes()),
        (DataType::Float64, Value::Float64(v)) => dst[..8].copy_from_slice(&v.to_le_bytes()),
        (expected, got) => {
            return Err(StoreError::InvalidArgument(format!(
                "column '{}' expects {}, got {got:?}",
                col.name,
                expected.token()
            ))
            .into())
        }
    }
    Ok(())
}

fn decode_scalar(data_type: DataType, src: &[u8]) -> Value {
    match data_type {
        DataType::Char => Value::Char(src[0]),
        DataType::WChar => Value::WChar(u16::from_le_bytes([src[0], src[1]])),
        DataType::Int8 => Value::Int8(src[0] as i8),
        DataType::Int16 => Value::Int16(i16::from_le_bytes([src[0], src[1]])),
        DataType::Int32 => Value::Int32(i32::from_le_bytes([src[0], src[1], src[2], src[3]])),
        DataType::Int64 => Value::Int64(i64::from_le_bytes(
            src[..8].try_into().expect("8-byte scalar"), // INVARIANT: width checked against schema
        )),
        DataType::Float32 => Value::Float32(f32::from_le_bytes([src[0], src[1], src[2], src[3]])),
        DataType::Float64 => Value::Float64(f64::from_le_bytes(
            src[..8].try_into().expect("8-byte scalar"), // INVARIANT: width checked against schema
        )),
        DataType::Str => unreachable!("string slots are decoded by unpack_row"),
    }
}

fn str_bytes<'v>(col: &Column, value: &'v Value) -> Result<&'v [u8]> {
    match value {
        Value::Str(s) => {
            if s.len() > u32::MAX as usize {
                return Err(StoreError::InvalidArgument(format!(
                    "string for column '{}' exceeds u32 length",
                    col.name
                ))
                .into());
            }
            Ok(s.as_bytes())
        }
        other => Err(StoreError::InvalidArgument(format!(
            "column '{}' expects STRING, got {other:?}",
            col.name
        ))
        .into()),
    }
}

/// Collects the per-slot string values of a column, zero-padding short
/// arrays with the empty string.
fn column_strings<'v>(col: &Column, value: &'v Value) -> Result<Vec<&'v [u8]>> {
    if col.count == 1 {
        return Ok(vec![str_bytes(col, value)?]);
    }
    let items = value.as_array().ok_or_else(|| {
        StoreError::InvalidArgument(format!(
            "column '{}' expects an array of up to {} strings, got {value:?}",
            col.name, col.count
        ))
    })?;
    if items.len() > col.count {
        return Err(StoreError::InvalidArgument(format!(
            "column '{}' holds at most {} strings, got {}",
            col.name,
            col.count,
            items.len()
        ))
        .into());
    }
    let mut out = Vec::with_capacity(col.count);
    for item in items {
        out.push(str_bytes(col, item)?);
    }
    out.resize(col.count, EMPTY);
    Ok(out)
}

impl Schema {
    /// Packs `row` into `dst` (exactly `row_size` bytes). String slots get
    /// their length and a zero offset; the table patches offsets once the
    /// payloads are in the heap.
    pub fn pack_row(&self, row: &Row, dst: &mut [u8]) -> Result<()> {
        if dst.len() != self.row_size() {
            return Err(StoreError::InvalidArgument(format!(
                "destination is {} bytes, packed row is {}",
                dst.len(),
                self.row_size()
            ))
            .into());
        }
        if row.len() != self.column_count() {
            return Err(StoreError::InvalidArgument(format!(
                "row has {} values, schema has {} columns",
                row.len(),
                self.column_count()
            ))
            .into());
        }
        dst.fill(0);

        for (idx, col) in self.columns().iter().enumerate() {
            let off = self.disk_offset(idx);
            let value = &row.values()[idx];
            let elem = col.data_type.disk_size();

            if col.data_type.is_string() {
                for (i, bytes) in column_strings(col, value)?.iter().enumerate() {
                    let slot = off + i * elem;
                    write_u32(dst, slot, bytes.len() as u32);
                    write_u64(dst, slot + 4, 0);
                }
                continue;
            }

            if col.count == 1 {
                encode_scalar(col, value, &mut dst[off..off + elem])?;
                continue;
            }

            // CHAR arrays additionally accept a quoted byte string.
            if col.data_type == DataType::Char {
                if let Value::Str(s) = value {
                    if s.len() > col.count {
                        return Err(StoreError::InvalidArgument(format!(
                            "column '{}' holds {} bytes, got {}",
                            col.name,
                            col.count,
                            s.len()
                        ))
                        .into());
                    }
                    dst[off..off + s.len()].copy_from_slice(s.as_bytes());
                    continue;
                }
            }

            let items = value.as_array().ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "column '{}' expects an array of up to {} {} values, got {value:?}",
                    col.name,
                    col.count,
                    col.data_type.token()
                ))
            })?;
            if items.len() > col.count {
                return Err(StoreError::InvalidArgument(format!(
                    "column '{}' holds at most {} values, got {}",
                    col.name,
                    col.count,
                    items.len()
                ))
                .into());
            }
            for (i, item) in items.iter().enumerate() {
                let at = off + i * elem;
                encode_scalar(col, item, &mut dst[at..at + elem])?;
            }
        }
        Ok(())
    }

    /// The string payloads of `row`, one entry per string slot in
    /// [`Schema::string_slots`] order.
    pub fn string_payloads<'r>(&self, row: &'r Row) -> Result<Vec<&'r [u8]>> {
        if !self.has_strings() {
            return Ok(Vec::new());
        }
        if row.len() != self.column_count() {
            return Err(StoreError::InvalidArgument(format!(
                "row has {} values, schema has {} columns",
                row.len(),
                self.column_count()
            ))
            .into());
        }
        let mut out = Vec::with_capacity(self.string_slots().len());
        for (idx, col) in self.columns().iter().enumerate() {
            if col.data_type.is_string() {
                out.extend(column_strings(col, &row.values()[idx])?);
            }
        }
        Ok(out)
    }

    /// Unpacks a packed row. `fetch` resolves each nonempty string slot's
    /// `(length, offset)` pair to its payload bytes.
    pub fn unpack_row(
        &self,
        src: &[u8],
        mut fetch: impl FnMut(u32, u64) -> Result<Vec<u8>>,
    ) -> Result<Row> {
        if src.len() != self.row_size() {
            return Err(StoreError::InvalidArgument(format!(
                "source is {} bytes, packed row is {}",
                src.len(),
                self.row_size()
            ))
            .into());
        }

        let mut values = Vec::with_capacity(self.column_count());
        for (idx, col) in self.columns().iter().enumerate() {
            let off = self.disk_offset(idx);
            let elem = col.data_type.disk_size();

            if col.data_type.is_string() {
                let mut items = Vec::with_capacity(col.count);
                for i in 0..col.count {
                    let slot = off + i * elem;
                    let len = read_u32(src, slot);
                    let heap_off = read_u64(src, slot + 4);
                    let s = if len == 0 {
                        String::new()
                    } else {
                        let bytes = fetch(len, heap_off)?;
                        String::from_utf8(bytes).map_err(|_| {
                            StoreError::Corruption(format!(
                                "string payload for column '{}' is not valid UTF-8",
                                col.name
                            ))
                        })?
                    };
                    items.push(Value::Str(s));
                }
                values.push(if col.count == 1 {
                    items.pop().expect("count >= 1") // INVARIANT: schema rejects count < 1
                } else {
                    Value::Array(items)
                });
                continue;
            }

            if col.count == 1 {
                values.push(decode_scalar(col.data_type, &src[off..off + elem]));
            } else {
                let items = (0..col.count)
                    .map(|i| {
                        let at = off + i * elem;
                        decode_scalar(col.data_type, &src[at..at + elem])
                    })
                    .collect();
                values.push(Value::Array(items));
            }
        }
        Ok(Row::new(values))
    }

    /// Copies each column from its padded offset to its packed offset.
    /// Schemas with string columns have no padded buffer form.
    pub fn pack_padded(&self, padded: &[u8], packed: &mut [u8]) -> Result<()> {
        self.check_padded_buffers(padded.len(), packed.len())?;
        for (idx, col) in self.columns().iter().enumerate() {
            let from = self.padded_layout().offset(idx);
            let to = self.disk_offset(idx);
            let width = col.disk_width();
            packed[to..to + width].copy_from_slice(&padded[from..from + width]);
        }
        Ok(())
    }

    /// Inverse of [`Schema::pack_padded`]; padding gaps are zeroed.
    pub fn unpack_padded(&self, packed: &[u8], padded: &mut [u8]) -> Result<()> {
        self.check_padded_buffers(padded.len(), packed.len())?;
        padded.fill(0);
        for (idx, col) in self.columns().iter().enumerate() {
            let from = self.disk_offset(idx);
            let to = self.padded_layout().offset(idx);
            let width = col.disk_width();
            padded[to..to + width].copy_from_slice(&packed[from..from + width]);
        }
        Ok(())
    }

    fn check_padded_buffers(&self, padded_len: usize, packed_len: usize) -> Result<()> {
        if self.has_strings() {
            return Err(StoreError::InvalidArgument(
                "schema contains string columns; owned strings have no padded buffer form".into(),
            )
            .into());
        }
        if padded_len != self.padded_layout().size() {
            return Err(StoreError::InvalidArgument(format!(
                "padded buffer is {} bytes, layout is {}",
                padded_len,
                self.padded_layout().size()
            ))
            .into());
        }
        if packed_len != self.row_size() {
            return Err(StoreError::InvalidArgument(format!(
                "packed buffer is {} bytes, row is {}",
                packed_len,
                self.row_size()
            ))
            .into());
        }
        Ok(())
    }

    /// Packs a `#[repr(C)]` record whose fields mirror the schema columns.
    pub fn pack_record<R: IntoBytes + Immutable>(&self, record: &R, packed: &mut [u8]) -> Result<()> {
        let bytes = record.as_bytes();
        if bytes.len() != self.padded_layout().size() {
            return Err(StoreError::InvalidArgument(format!(
                "record is {} bytes, padded layout is {}",
                bytes.len(),
                self.padded_layout().size()
            ))
            .into());
        }
        self.pack_padded(bytes, packed)
    }

    /// Reads a `#[repr(C)]` record back out of a packed row.
    pub fn unpack_record<R: FromBytes>(&self, packed: &[u8]) -> Result<R> {
        let mut padded = vec![0u8; self.padded_layout().size()];
        self.unpack_padded(packed, &mut padded)?;
        R::read_from_bytes(&padded).map_err(|_| {
            StoreError::InvalidArgument(format!(
                "record size disagrees with the {}-byte padded layout",
                self.padded_layout().size()
            ))
            .into()
        })
    }
}
