//! # Storage Layer
//!
//! Everything that touches the two table files:
//!
//! - `file`: a shared data-file handle with reader/writer lock discipline
//! - `meta`: the fixed-size metadata header at the front of the data file
//! - `frame`: the paging unit - lazy load, flush, idle eviction
//! - `strings`: the out-of-line heap for variable-length string payloads
//!
//! ## Data-File Layout
//!
//! ```text
//! Offset            Size          Description
//! 0                 2048          Metadata (schema text + counters)
//! 2048              4             Frame 0 element count (u32)
//! 2052              frame_size    Frame 0 payload
//! 2052+frame_size   4             Frame 1 element count
//! ...
//! ```
//!
//! ## Lock Ordering
//!
//! A frame's lock is always acquired before the data-file lock, and before
//! the strings-file lock. The two file locks are never held together.

pub mod file;
pub mod frame;
pub mod meta;
pub mod strings;

pub use file::DataFile;
pub use frame::{Frame, FrameState};
pub use meta::TableMeta;
pub use strings::StringHeap;
