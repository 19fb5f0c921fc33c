//! # Table
//!
//! The single public abstraction: a schema-typed relation backed by one
//! data file (metadata header + frames) and, when the schema has string
//! columns, one strings file.
//!
//! ## Lifecycle
//!
//! ```text
//! Absent ──create──> Fresh      file truncated, metadata written
//! Empty  ──create──> Fresh      same (a zero-length file counts as absent)
//! Populated ──open──> Ready     metadata read and validated; a supplied
//!                               schema must match it
//! Ready ──close/drop──> Closed  metadata rewritten, loaded frames flushed
//! ```
//!
//! A table named `T` lives at `T_table.db` / `T_table_strings.db`; the
//! constructor argument is the path prefix (`./data/products` names
//! `./data/products_table.db`).
//!
//! ## Frames
//!
//! Rows append into the first frame with spare capacity; a new frame is
//! written (zeroed) at the end of the file when every frame is full. The
//! frame vector only grows during a table's lifetime (`clear` resets it
//! wholesale), and each frame guards its own buffer, so operations on
//! distinct frames run in parallel.

mod ops;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use parking_lot::RwLock;

use crate::config::{
    CACHE_LIFETIME, FRAME_COUNT_SIZE, FRAME_ROWS_TARGET, MAX_FRAME_SIZE, METADATA_LENGTH,
    MIN_FRAME_SIZE,
};
use crate::error::StoreError;
use crate::records::Schema;
use crate::storage::{DataFile, Frame, FrameState, StringHeap, TableMeta};

pub struct Table {
    name: String,
    schema: Schema,
    row_size: usize,
    frame_size: usize,
    frame_capacity: usize,
    file: Arc<DataFile>,
    frames: RwLock<Vec<Arc<Frame>>>,
    elements: AtomicU32,
    strings: Option<StringHeap>,
    cache_lifetime: Duration,
    closed: AtomicBool,
}

impl Table {
    /// Opens an existing table; the schema comes from the metadata header.
    pub fn open(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        Self::load_existing(base, None)
    }

    /// Opens the table if its file exists and is non-empty (the supplied
    /// schema must then match the stored one), otherwise creates it fresh.
    pub fn create(base: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let base = base.as_ref();
        let data_path = Self::data_path(base)?;
        let populated = data_path.exists() && std::fs::metadata(&data_path)?.len() > 0;
        if populated {
            return Self::load_existing(base, Some(&schema));
        }

        let name = Self::table_name(base)?;
        let row_size = schema.row_size();
        if row_size == 0 {
            return Err(StoreError::InvalidSchema("schema has no columns".into()).into());
        }

        let mut frame_size = row_size * FRAME_ROWS_TARGET;
        if frame_size <= MIN_FRAME_SIZE {
            frame_size = MIN_FRAME_SIZE;
        } else if frame_size >= MAX_FRAME_SIZE {
            return Err(StoreError::TooBigRow(format!(
                "row of {row_size} bytes needs a {frame_size}-byte frame, limit is {MAX_FRAME_SIZE}"
            ))
            .into());
        }
        let frame_capacity = frame_size / row_size;

        let file = Arc::new(DataFile::create(&data_path)?);
        let strings = if schema.has_strings() {
            let heap = StringHeap::open(Self::strings_path(base)?)?;
            heap.truncate()?;
            Some(heap)
        } else {
            None
        };

        let table = Self {
            name,
            schema,
            row_size,
            frame_size,
            frame_capacity,
            file,
            frames: RwLock::new(Vec::new()),
            elements: AtomicU32::new(0),
            strings,
            cache_lifetime: CACHE_LIFETIME,
            closed: AtomicBool::new(false),
        };
        table.write_metadata()?;
        tracing::debug!(table = %table.name, frame_size, "created table");
        Ok(table)
    }

    fn load_existing(base: &Path, expected: Option<&Schema>) -> Result<Self> {
        let name = Self::table_name(base)?;
        let file = Arc::new(DataFile::open(Self::data_path(base)?)?);
        if file.is_empty()? {
            return Err(
                StoreError::Corruption(format!("table file for '{name}' has no metadata")).into(),
            );
        }

        let mut buf = [0u8; METADATA_LENGTH];
        file.read_exact_at(0, &mut buf)?;
        let meta = TableMeta::decode(&buf)?;

        let schema = Schema::parse(&meta.schema_text)?;
        if let Some(expected) = expected {
            if *expected != schema {
                return Err(StoreError::SchemaMismatch(format!(
                    "table '{}' stores schema {}, caller supplied {}",
                    name,
                    schema.canonical(),
                    expected.canonical()
                ))
                .into());
            }
        }

        let row_size = schema.row_size();
        let frame_size = meta.frame_size as usize;
        let frame_capacity = frame_size / row_size;
        if frame_capacity == 0 {
            return Err(StoreError::Corruption(format!(
                "frame size {frame_size} cannot hold a single {row_size}-byte row"
            ))
            .into());
        }

        let mut frames = Vec::with_capacity(meta.frame_count as usize);
        let mut total = 0u64;
        for i in 0..meta.frame_count as usize {
            let file_pos =
                (METADATA_LENGTH + i * (frame_size + FRAME_COUNT_SIZE) + FRAME_COUNT_SIZE) as u64;
            let mut header = [0u8; FRAME_COUNT_SIZE];
            file.read_exact_at(file_pos - FRAME_COUNT_SIZE as u64, &mut header)?;
            let count = u32::from_le_bytes(header);
            if count > frame_capacity as u32 {
                return Err(StoreError::Corruption(format!(
                    "frame {i} holds {count} rows, capacity is {frame_capacity}"
                ))
                .into());
            }
            total += count as u64;
            frames.push(Arc::new(Frame::new(file_pos, count)));
        }
        if total != meta.element_count as u64 {
            return Err(StoreError::Corruption(format!(
                "metadata says {} elements, frames hold {total}",
                meta.element_count
            ))
            .into());
        }

        let strings = if schema.has_strings() {
            Some(StringHeap::open(Self::strings_path(base)?)?)
        } else {
            None
        };

        tracing::debug!(table = %name, frames = frames.len(), elements = meta.element_count, "opened table");
        Ok(Self {
            name,
            schema,
            row_size,
            frame_size,
            frame_capacity,
            file,
            frames: RwLock::new(frames),
            elements: AtomicU32::new(meta.element_count),
            strings,
            cache_lifetime: CACHE_LIFETIME,
            closed: AtomicBool::new(false),
        })
    }

    /// Flushes every loaded frame and rewrites the metadata header, then
    /// consumes the table. `Drop` does the same best-effort.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.write_metadata()?;
        self.flush_all()?;
        if let Some(heap) = &self.strings {
            heap.sync()?;
        }
        tracing::debug!(table = %self.name, "closed table");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.elements.load(Ordering::Relaxed) as usize
    }

    pub fn frame_count(&self) -> usize {
        self.frames.read().len()
    }

    /// Per-frame element counts in frame order.
    pub fn frame_counts(&self) -> Vec<u32> {
        self.frames.read().iter().map(|f| f.count()).collect()
    }

    fn table_name(base: &Path) -> Result<String> {
        match base.file_name() {
            Some(name) if !name.is_empty() => Ok(name.to_string_lossy().into_owned()),
            _ => Err(StoreError::InvalidArgument(format!(
                "'{}' has no table name component",
                base.display()
            ))
            .into()),
        }
    }

    fn data_path(base: &Path) -> Result<PathBuf> {
        Self::suffixed_path(base, "_table.db")
    }

    fn strings_path(base: &Path) -> Result<PathBuf> {
        Self::suffixed_path(base, "_table_strings.db")
    }

    fn suffixed_path(base: &Path, suffix: &str) -> Result<PathBuf> {
        let mut name = match base.file_name() {
            Some(name) if !name.is_empty() => name.to_os_string(),
            _ => {
                return Err(StoreError::InvalidArgument(format!(
                    "'{}' has no table name component",
                    base.display()
                ))
                .into())
            }
        };
        name.push(suffix);
        Ok(base.with_file_name(name))
    }

    fn write_metadata(&self) -> Result<()> {
        let meta = TableMeta {
            schema_text: self.schema.canonical(),
            frame_size: self.frame_size as u32,
            frame_count: self.frames.read().len() as u32,
            element_count: self.elements.load(Ordering::Relaxed),
        };
        self.file.write_all_at(0, &meta.encode()?)?;
        self.file.sync()
    }

    fn flush_all(&self) -> Result<()> {
        let snapshot: Vec<Arc<Frame>> = self.frames.read().clone();
        for frame in snapshot {
            frame.flush(&self.file, self.frame_size)?;
        }
        Ok(())
    }

    /// Appends a zeroed frame at the end of the file and registers it.
    fn add_frame(&self) -> Result<Arc<Frame>> {
        let mut frames = self.frames.write();
        let idx = frames.len();
        let file_pos = (METADATA_LENGTH
            + idx * (self.frame_size + FRAME_COUNT_SIZE)
            + FRAME_COUNT_SIZE) as u64;
        self.file.write_all_at(
            file_pos - FRAME_COUNT_SIZE as u64,
            &vec![0u8; FRAME_COUNT_SIZE + self.frame_size],
        )?;
        let frame = Arc::new(Frame::new(file_pos, 0));
        frames.push(Arc::clone(&frame));
        Ok(frame)
    }

    fn frame_snapshot(&self) -> Vec<Arc<Frame>> {
        self.frames.read().clone()
    }

    /// Runs `f` against the loaded frame under the shared lock, retrying
    /// the load if the evictor raced the acquisition.
    fn with_frame_read<T>(
        &self,
        frame: &Arc<Frame>,
        mut f: impl FnMut(&FrameState) -> T,
    ) -> Result<T> {
        loop {
            frame.load(&self.file, self.frame_size, self.cache_lifetime)?;
            let state = frame.state.read();
            if state.data.is_some() {
                return Ok(f(&state));
            }
        }
    }

    /// Exclusive counterpart of [`Table::with_frame_read`].
    fn with_frame_write<T>(
        &self,
        frame: &Arc<Frame>,
        mut f: impl FnMut(&mut FrameState) -> T,
    ) -> Result<T> {
        loop {
            frame.load(&self.file, self.frame_size, self.cache_lifetime)?;
            let mut state = frame.state.write();
            if state.data.is_some() {
                return Ok(f(&mut state));
            }
        }
    }

    fn heap(&self) -> &StringHeap {
        self.strings
            .as_ref()
            .expect("strings heap exists whenever the schema has string columns") // INVARIANT: constructors open it for string schemas
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(table = %self.name, error = %err, "failed to flush table on drop");
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("schema", &self.schema.canonical())
            .field("row_size", &self.row_size)
            .field("frame_size", &self.frame_size)
            .field("frames", &self.frames.read().len())
            .field("elements", &self.elements.load(Ordering::Relaxed))
            .finish()
    }
}
