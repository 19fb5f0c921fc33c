//! # Error Kinds
//!
//! All fallible operations return [`eyre::Result`]; the typed kinds below ride
//! inside the `eyre::Report` so callers that need to branch on a category can
//! recover it:
//!
//! ```ignore
//! match table.get_element(999) {
//!     Err(e) if matches!(e.downcast_ref(), Some(StoreError::OutOfRange(_))) => { ... }
//!     other => { ... }
//! }
//! ```
//!
//! I/O failures are plain `std::io::Error`s wrapped with path context and are
//! downcastable the same way.

/// The error categories surfaced by the storage engine.
#[derive(Debug)]
pub enum StoreError {
    /// Malformed schema text, an empty or duplicate column name, or a
    /// non-positive repetition count.
    InvalidSchema(String),
    /// An existing table's metadata disagrees with the supplied schema.
    SchemaMismatch(String),
    /// A row or the metadata header exceeds the allowed bounds.
    TooBigRow(String),
    /// An index past the row count, or a strings-file offset past end-of-file.
    OutOfRange(String),
    /// A `find_first`/`pop_first` predicate matched nothing.
    NotFound,
    /// A value of the wrong shape for its column, or an oversized payload.
    InvalidArgument(String),
    /// Metadata fields outside their allowed ranges, or a strings-heap
    /// length that disagrees with the row slot referencing it.
    Corruption(String),
    /// The insert-query parser rejected the input.
    InvalidQuery(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidSchema(msg) => write!(f, "invalid schema: {msg}"),
            StoreError::SchemaMismatch(msg) => write!(f, "schema mismatch: {msg}"),
            StoreError::TooBigRow(msg) => write!(f, "row too big: {msg}"),
            StoreError::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            StoreError::NotFound => write!(f, "no row matched the predicate"),
            StoreError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            StoreError::Corruption(msg) => write!(f, "corruption detected: {msg}"),
            StoreError::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}
