//! # framedb - Frame-Paged Embedded Row Store
//!
//! framedb is a small embedded storage engine exposing a single schema-typed
//! table: rows are packed to a fixed on-disk size, grouped into fixed-size
//! frames that are paged in on demand and evicted after an idle window, and
//! variable-length strings live out of line in a side heap keyed by byte
//! offset.
//!
//! ## Quick Start
//!
//! ```ignore
//! use framedb::{Schema, Table};
//!
//! let schema = Schema::parse("|id:INT32|name:STRING|price:FLOAT32|")?;
//! let table = Table::create("./products", schema)?;
//!
//! table.add("(1, 'Intel', 589.99), (2, 'AMD', 699.99)")?;
//! assert_eq!(table.row_count(), 2);
//!
//! let rows = table.get_all()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │          Public API (Table)          │
//! ├─────────────────────────────────────┤
//! │     Insert Query Parser (parsing)    │
//! ├──────────────────┬──────────────────┤
//! │  Row Pack/Unpack │   Strings Heap   │
//! │     (records)    │    (storage)     │
//! ├──────────────────┴──────────────────┤
//! │  Frame Cache + Idle Eviction (storage)│
//! ├─────────────────────────────────────┤
//! │   Positioned File I/O + Metadata     │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A table named `T` owns up to two files:
//!
//! ```text
//! T_table.db           # 2KB metadata header, then (count:u32, payload) frames
//! T_table_strings.db   # (length:u32, bytes) records; zeroed records are
//!                      # tombstones eligible for reuse
//! ```
//!
//! ## Module Overview
//!
//! - [`records`]: column types, schema text, row layouts, pack/unpack
//! - [`storage`]: data file, metadata header, frame cache, strings heap
//! - [`table`]: the table itself - CRUD, scans, lifecycle
//! - [`parsing`]: the textual insert-query parser
//! - [`config`]: frame, metadata, and cache-lifetime constants

pub mod config;
pub mod error;
pub mod parsing;
pub mod records;
pub mod storage;
pub mod table;

pub use error::StoreError;
pub use parsing::AddResult;
pub use records::{Column, DataType, Row, Schema, Value};
pub use table::Table;
