//! # framedb Configuration Constants
//!
//! This module centralizes the constants that shape the on-disk format and
//! the cache behavior. Values that depend on each other are co-located and
//! guarded by compile-time assertions so a change to one cannot silently
//! invalidate another.
//!
//! ## Dependency Graph
//!
//! ```text
//! MIN_FRAME_SIZE (4096 bytes)
//!       │
//!       └─> frame_size = max(row_size * FRAME_ROWS_TARGET, MIN_FRAME_SIZE)
//!             Construction fails with TooBigRow once this reaches
//!             MAX_FRAME_SIZE.
//!
//! METADATA_LENGTH (2048 bytes)
//!       │
//!       └─> schema text + METADATA_FIXED_OVERHEAD must fit inside it;
//!           frame 0 starts at METADATA_LENGTH.
//!
//! STRING_SLOT_SIZE (12 bytes)
//!       │
//!       └─> u32 length + u64 strings-file offset; the unit every string
//!           column occupies in a packed row.
//! ```

use std::time::Duration;

/// Smallest frame payload ever written (4 KB).
/// Tables with tiny rows still page in useful chunks.
pub const MIN_FRAME_SIZE: usize = 4096;

/// Largest allowed frame payload (1 MB).
/// A schema whose sized frame reaches this bound is rejected with `TooBigRow`.
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// Number of rows a freshly sized frame aims to hold.
pub const FRAME_ROWS_TARGET: usize = 64;

/// Size of the per-frame element-count header preceding each frame payload.
pub const FRAME_COUNT_SIZE: usize = 4;

/// Size of the metadata region at the start of the data file (2 KB).
/// Frames begin immediately after it.
pub const METADATA_LENGTH: usize = 2048;

/// Bytes of the metadata header that are not schema text:
/// the schema-length word plus frame size, frame count, and element count.
pub const METADATA_FIXED_OVERHEAD: usize = 16;

/// Packed width of one string slot: u32 length + u64 strings-file offset.
pub const STRING_SLOT_SIZE: usize = 12;

/// Idle window after which a loaded frame is flushed and its buffer dropped.
pub const CACHE_LIFETIME: Duration = Duration::from_secs(15);

const _: () = assert!(
    MIN_FRAME_SIZE <= MAX_FRAME_SIZE,
    "frame size bounds are inverted"
);

const _: () = assert!(
    METADATA_FIXED_OVERHEAD < METADATA_LENGTH,
    "metadata overhead must leave room for schema text"
);

const _: () = assert!(
    STRING_SLOT_SIZE == 4 + 8,
    "string slot is a u32 length followed by a u64 offset"
);
