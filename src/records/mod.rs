//! # Row Records
//!
//! This module owns everything about the shape of a row:
//!
//! - `types`: the primitive column types and the `Column` definition
//! - `schema`: the ordered column list with its pre-computed derived tables
//! - `layout`: the naturally aligned in-memory ("padded") layout
//! - `row`: the dynamic `Value`/`Row` representation
//! - `pack`: conversions between rows and the packed on-disk form
//!
//! ## Packed vs Padded
//!
//! A packed row is exactly `row_size` bytes: fields in declaration order,
//! little-endian, no gaps. String columns occupy a fixed 12-byte slot
//! (u32 length + u64 strings-file offset) regardless of payload length.
//!
//! The padded layout places the same fields at naturally aligned offsets,
//! matching what `#[repr(C)]` produces for an equivalent struct. Schemas
//! without string columns can move `#[repr(C)]` records straight through
//! the table via the zerocopy-backed typed path.

pub mod layout;
pub mod pack;
pub mod row;
pub mod schema;
pub mod types;

pub use layout::{PaddedLayout, PaddingRun};
pub use row::{Row, Value};
pub use schema::Schema;
pub use types::{Column, DataType};
