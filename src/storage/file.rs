//! # Shared Data-File Handle
//!
//! One open handle per table data file, wrapped in a reader/writer lock:
//! frame loads read under the shared lock and may proceed in parallel,
//! while frame flushes and metadata rewrites take it exclusively. Each
//! operation is a single positioned read or write, so callers batch a
//! frame's count header and payload into one buffer rather than issuing
//! two calls.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use parking_lot::RwLock;

#[derive(Debug)]
pub struct DataFile {
    path: PathBuf,
    file: File,
    lock: RwLock<()>,
}

impl DataFile {
    /// Opens an existing file for read/write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open '{}'", path.display()))?;
        Ok(Self {
            path,
            file,
            lock: RwLock::new(()),
        })
    }

    /// Creates the file, truncating any previous contents.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to create '{}'", path.display()))?;
        Ok(Self {
            path,
            file,
            lock: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Result<u64> {
        let meta = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?;
        Ok(meta.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads `buf.len()` bytes at `offset` under the shared lock.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let _shared = self.lock.read();
        self.file.read_exact_at(buf, offset).wrap_err_with(|| {
            format!(
                "failed to read {} bytes at {} from '{}'",
                buf.len(),
                offset,
                self.path.display()
            )
        })
    }

    /// Writes the whole buffer at `offset` under the exclusive lock.
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let _exclusive = self.lock.write();
        self.file.write_all_at(buf, offset).wrap_err_with(|| {
            format!(
                "failed to write {} bytes at {} to '{}'",
                buf.len(),
                offset,
                self.path.display()
            )
        })
    }

    /// Truncates the file to `len` bytes under the exclusive lock.
    pub fn set_len(&self, len: u64) -> Result<()> {
        let _exclusive = self.lock.write();
        self.file
            .set_len(len)
            .wrap_err_with(|| format!("failed to truncate '{}'", self.path.display()))
    }

    /// Forces written data to disk.
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

    #[test]
    fn test_create_write_read() {
        let dir = tempdir().unwrap();
        let file = DataFile::create(dir.path().join("t.db")).unwrap();

        file.write_all_at(8, b"hello").unwrap();
        let mut buf = [0u8; 5];
        file.read_exact_at(8, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(file.len().unwrap(), 13);
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempdir().unwrap();
        assert!(DataFile::open(dir.path().join("absent.db")).is_err());
    }

    #[test]
    fn test_create_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let file = DataFile::create(&path).unwrap();
            file.write_all_at(0, &[1u8; 64]).unwrap();
        }
        let file = DataFile::create(&path).unwrap();
        assert!(file.is_empty().unwrap());
    }
}
