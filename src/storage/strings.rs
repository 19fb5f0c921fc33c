//! # Strings Heap
//!
//! The side file holding variable-length string payloads. Rows reference a
//! payload by `(length, byte offset)`; the file itself is a concatenation
//! of `(length:u32_le, bytes[length])` records.
//!
//! Removal does not relocate anything: the record's length header and
//! payload are overwritten with zeros, leaving a tombstone. `add` scans for
//! the first tombstone with enough zeroed room before appending at
//! end-of-file, so space is reused without ever moving a live offset.
//!
//! The empty string is the sentinel `(0, 0)` and never touches the file.
//!
//! All operations serialize through the strings-file lock: `get` shares it,
//! `add`/`remove`/`truncate` take it exclusively.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use parking_lot::RwLock;

use crate::error::StoreError;

const SCAN_CHUNK: usize = 4096;

#[derive(Debug)]
pub struct StringHeap {
    path: PathBuf,
    file: File,
    lock: RwLock<()>,
}

impl StringHeap {
    /// Opens the heap file, creating it when absent. Existing contents are
    /// kept - live offsets in the table must stay valid.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open strings file '{}'", path.display()))?;
        Ok(Self {
            path,
            file,
            lock: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_len(&self) -> Result<u64> {
        let meta = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?;
        Ok(meta.len())
    }

    fn read_u32_at(&self, offset: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.file.read_exact_at(&mut buf, offset).wrap_err_with(|| {
            format!(
                "failed to read length header at {} in '{}'",
                offset,
                self.path.display()
            )
        })?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Counts zero bytes from `offset`, up to `wanted` or end-of-file.
    fn zero_run(&self, offset: u64, wanted: u64, file_len: u64) -> Result<u64> {
        let mut run = 0u64;
        let mut chunk = [0u8; SCAN_CHUNK];
        let mut at = offset;
        while run < wanted && at < file_len {
            let take = (file_len - at).min(SCAN_CHUNK as u64) as usize;
            self.file
                .read_exact_at(&mut chunk[..take], at)
                .wrap_err_with(|| format!("failed to scan '{}'", self.path.display()))?;
            for &b in &chunk[..take] {
                if b != 0 {
                    return Ok(run);
                }
                run += 1;
                if run == wanted {
                    return Ok(run);
                }
            }
            at += take as u64;
        }
        Ok(run)
    }

    /// Stores a payload and returns its file offset. Empty payloads return
    /// the sentinel offset 0 without touching the file; otherwise the first
    /// tombstone with enough zeroed room is reused, falling back to
    /// appending at end-of-file.
    pub fn add(&self, bytes: &[u8]) -> Result<u64> {
        if bytes.is_empty() {
            return Ok(0);
        }
        if bytes.len() > u32::MAX as usize {
            return Err(StoreError::InvalidArgument(format!(
                "string payload of {} bytes exceeds u32 length",
                bytes.len()
            ))
            .into());
        }

        let _exclusive = self.lock.write();
        let file_len = self.file_len()?;
        let wanted = bytes.len() as u64;

        let mut pos = 0u64;
        while pos + 4 <= file_len {
            let header = self.read_u32_at(pos)?;
            if header != 0 {
                pos += 4 + header as u64;
                continue;
            }
            let run = self.zero_run(pos + 4, wanted, file_len)?;
            if run >= wanted {
                self.write_record(pos, bytes)?;
                return Ok(pos);
            }
            pos += 4 + run;
        }

        self.write_record(file_len, bytes)?;
        Ok(file_len)
    }

    fn write_record(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut record = Vec::with_capacity(4 + bytes.len());
        record.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        record.extend_from_slice(bytes);
        self.file.write_all_at(&record, offset).wrap_err_with(|| {
            format!(
                "failed to write string record at {} in '{}'",
                offset,
                self.path.display()
            )
        })
    }

    /// Fetches the payload at `offset`, verifying the stored length against
    /// the row slot's `len`.
    pub fn get(&self, offset: u64, len: u32) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let _shared = self.lock.read();
        let file_len = self.file_len()?;
        if offset > file_len {
            return Err(StoreError::OutOfRange(format!(
                "string offset {offset} past end of file ({file_len} bytes)"
            ))
            .into());
        }

        let stored = self.read_u32_at(offset)?;
        if stored != len {
            return Err(StoreError::Corruption(format!(
                "string record at {offset} has length {stored}, row slot says {len}"
            ))
            .into());
        }

        let mut payload = vec![0u8; len as usize];
        self.file
            .read_exact_at(&mut payload, offset + 4)
            .wrap_err_with(|| {
                format!(
                    "failed to read {} payload bytes at {} from '{}'",
                    len,
                    offset + 4,
                    self.path.display()
                )
            })?;
        Ok(payload)
    }

    /// Turns the record at `offset` into a tombstone: the length header and
    /// the payload are zeroed, making the region reusable.
    pub fn remove(&self, offset: u64, len: u32) -> Result<()> {
        if len == 0 {
            return Ok(());
        }

        let _exclusive = self.lock.write();
        let file_len = self.file_len()?;
        if offset + 4 + len as u64 > file_len {
            return Err(StoreError::OutOfRange(format!(
                "string record at {offset} (+{len} bytes) past end of file"
            ))
            .into());
        }

        let stored = self.read_u32_at(offset)?;
        if stored != len {
            return Err(StoreError::Corruption(format!(
                "string record at {offset} has length {stored}, row slot says {len}"
            ))
            .into());
        }

        let zeros = vec![0u8; 4 + len as usize];
        self.file.write_all_at(&zeros, offset).wrap_err_with(|| {
            format!(
                "failed to tombstone string record at {} in '{}'",
                offset,
                self.path.display()
            )
        })
    }

    /// Drops every record. Used by `Table::clear`.
    pub fn truncate(&self) -> Result<()> {
        let _exclusive = self.lock.write();
        self.file
            .set_len(0)
            .wrap_err_with(|| format!("failed to truncate '{}'", self.path.display()))
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_data()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn heap() -> (StringHeap, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let heap = StringHeap::open(dir.path().join("t_table_strings.db")).unwrap();
        (heap, dir)
    }

    #[test]
    fn test_add_get_roundtrip() {
        let (heap, _dir) = heap();
        let a = heap.add(b"Intel").unwrap();
        let b = heap.add(b"AMD").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 9);
        assert_eq!(heap.get(a, 5).unwrap(), b"Intel");
        assert_eq!(heap.get(b, 3).unwrap(), b"AMD");
    }

    #[test]
    fn test_empty_string_sentinel() {
        let (heap, _dir) = heap();
        assert_eq!(heap.add(b"").unwrap(), 0);
        assert_eq!(heap.file_len().unwrap(), 0);
        assert_eq!(heap.get(0, 0).unwrap(), b"");
    }

    #[test]
    fn test_remove_leaves_zeroed_tombstone() {
        let (heap, _dir) = heap();
        let a = heap.add(b"NVIDIA").unwrap();
        heap.remove(a, 6).unwrap();
        assert_eq!(heap.read_u32_at(a).unwrap(), 0);
        assert_eq!(heap.zero_run(a + 4, 6, heap.file_len().unwrap()).unwrap(), 6);
    }

    #[test]
    fn test_tombstone_reused_by_smaller_payload() {
        let (heap, _dir) = heap();
        let a = heap.add(b"NVIDIA").unwrap();
        let b = heap.add(b"Intel").unwrap();
        heap.remove(a, 6).unwrap();

        let c = heap.add(b"AMD").unwrap();
        assert_eq!(c, a);
        assert_eq!(heap.get(c, 3).unwrap(), b"AMD");
        assert_eq!(heap.get(b, 5).unwrap(), b"Intel");
    }

    #[test]
    fn test_oversized_payload_appends_past_tombstone() {
        let (heap, _dir) = heap();
        let a = heap.add(b"abc").unwrap();
        let b = heap.add(b"defg").unwrap();
        heap.remove(a, 3).unwrap();

        let end = heap.file_len().unwrap();
        let c = heap.add(b"much longer payload").unwrap();
        assert_eq!(c, end);
        assert_eq!(heap.get(b, 4).unwrap(), b"defg");
    }

    #[test]
    fn test_length_mismatch_is_corruption() {
        let (heap, _dir) = heap();
        let a = heap.add(b"Intel").unwrap();
        let err = heap.get(a, 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn test_offset_past_eof_is_out_of_range() {
        let (heap, _dir) = heap();
        heap.add(b"Intel").unwrap();
        let err = heap.get(1000, 5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_truncate_empties_the_file() {
        let (heap, _dir) = heap();
        heap.add(b"Intel").unwrap();
        heap.truncate().unwrap();
        assert_eq!(heap.file_len().unwrap(), 0);
    }
}
