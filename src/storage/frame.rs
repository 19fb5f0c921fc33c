//! # Frames
//!
//! A frame is the paging unit: `frame_capacity` consecutive rows plus a
//! u32 element-count header persisted at `file_pos - 4`. The in-memory
//! side is an optional buffer guarded by a reader/writer lock, plus an
//! atomic accessed flag:
//!
//! - `load` marks the frame accessed and, when the buffer is absent,
//!   reads the count and payload from disk and spawns the evictor.
//! - The evictor wakes every `CACHE_LIFETIME`, clears the accessed flag,
//!   and once a full idle window passes untouched it flushes the frame
//!   and drops the buffer. The thread then exits; the next `load` spawns
//!   a fresh one.
//! - `flush` writes the count and payload back in one exclusive write and
//!   forces the file.
//!
//! The element count stays valid while the buffer is evicted: every
//! mutation happens with the buffer loaded, and eviction flushes before
//! dropping, so memory and disk agree whenever `data` is `None`.
//!
//! Evictors hold only `Weak` references. A dropped table (which flushes
//! everything itself) never waits on its evictors, and they never keep its
//! file alive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use eyre::{Result, WrapErr};
use parking_lot::RwLock;

use crate::config::FRAME_COUNT_SIZE;

use super::file::DataFile;

#[derive(Debug)]
pub struct FrameState {
    pub count: u32,
    pub data: Option<Box<[u8]>>,
}

#[derive(Debug)]
pub struct Frame {
    file_pos: u64,
    pub(crate) state: RwLock<FrameState>,
    accessed: AtomicBool,
}

impl Frame {
    /// `file_pos` is the payload position; the count header lives at
    /// `file_pos - 4`.
    pub fn new(file_pos: u64, count: u32) -> Self {
        Self {
            file_pos,
            state: RwLock::new(FrameState { count, data: None }),
            accessed: AtomicBool::new(false),
        }
    }

    pub fn file_pos(&self) -> u64 {
        self.file_pos
    }

    pub fn count(&self) -> u32 {
        self.state.read().count
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().data.is_some()
    }

    /// Marks the frame accessed and pulls it into memory if needed.
    pub fn load(
        self: &Arc<Self>,
        file: &Arc<DataFile>,
        frame_size: usize,
        lifetime: Duration,
    ) -> Result<()> {
        self.accessed.store(true, Ordering::Release);

        if self.state.read().data.is_some() {
            return Ok(());
        }

        let mut state = self.state.write();
        if state.data.is_some() {
            return Ok(());
        }

        let mut buf = vec![0u8; FRAME_COUNT_SIZE + frame_size];
        file.read_exact_at(self.file_pos - FRAME_COUNT_SIZE as u64, &mut buf)?;
        state.count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let payload = buf.split_off(FRAME_COUNT_SIZE);
        state.data = Some(payload.into_boxed_slice());

        let frame = Arc::downgrade(self);
        let file = Arc::downgrade(file);
        std::thread::Builder::new()
            .name("framedb-evict".into())
            .spawn(move || run_evictor(frame, file, frame_size, lifetime))
            .wrap_err("failed to spawn frame evictor")?;
        Ok(())
    }

    /// Writes the count header and payload back and forces the file.
    /// A frame without a buffer has nothing newer than disk.
    pub fn flush(&self, file: &DataFile, frame_size: usize) -> Result<()> {
        let state = self.state.write();
        if let Some(data) = &state.data {
            let mut buf = Vec::with_capacity(FRAME_COUNT_SIZE + frame_size);
            buf.extend_from_slice(&state.count.to_le_bytes());
            buf.extend_from_slice(data);
            file.write_all_at(self.file_pos - FRAME_COUNT_SIZE as u64, &buf)?;
            file.sync()?;
        }
        Ok(())
    }
}

fn run_evictor(frame: Weak<Frame>, file: Weak<DataFile>, frame_size: usize, lifetime: Duration) {
    loop {
        match frame.upgrade() {
            None => return,
            Some(f) => {
                if !f.accessed.swap(false, Ordering::AcqRel) {
                    break;
                }
            }
        }
        std::thread::sleep(lifetime);
    }

    let (Some(frame), Some(file)) = (frame.upgrade(), file.upgrade()) else {
        return;
    };
    if let Err(err) = frame.flush(&file, frame_size) {
        tracing::warn!(
            file_pos = frame.file_pos,
            error = %err,
            "failed to flush idle frame; keeping it loaded"
        );
        return;
    }
    frame.state.write().data = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FRAME_SIZE: usize = 64;

    fn frame_file() -> (Arc<DataFile>, Arc<Frame>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let file = Arc::new(DataFile::create(dir.path().join("t.db")).unwrap());
        file.write_all_at(0, &vec![0u8; FRAME_COUNT_SIZE + FRAME_SIZE])
            .unwrap();
        let frame = Arc::new(Frame::new(FRAME_COUNT_SIZE as u64, 0));
        (file, frame, dir)
    }

    #[test]
    fn test_load_reads_count_and_payload() {
        let (file, frame, _dir) = frame_file();
        let mut image = vec![0u8; FRAME_COUNT_SIZE + FRAME_SIZE];
        image[..4].copy_from_slice(&3u32.to_le_bytes());
        image[4] = 0xAB;
        file.write_all_at(0, &image).unwrap();

        frame.load(&file, FRAME_SIZE, Duration::from_secs(60)).unwrap();
        let state = frame.state.read();
        assert_eq!(state.count, 3);
        assert_eq!(state.data.as_ref().unwrap()[0], 0xAB);
    }

    #[test]
    fn test_flush_persists_mutations() {
        let (file, frame, _dir) = frame_file();
        frame.load(&file, FRAME_SIZE, Duration::from_secs(60)).unwrap();
        {
            let mut state = frame.state.write();
            state.count = 2;
            state.data.as_mut().unwrap()[10] = 0x5A;
        }
        frame.flush(&file, FRAME_SIZE).unwrap();

        let other = Arc::new(Frame::new(FRAME_COUNT_SIZE as u64, 0));
        other.load(&file, FRAME_SIZE, Duration::from_secs(60)).unwrap();
        let state = other.state.read();
        assert_eq!(state.count, 2);
        assert_eq!(state.data.as_ref().unwrap()[10], 0x5A);
    }

    #[test]
    fn test_idle_frame_is_flushed_and_evicted() {
        let (file, frame, _dir) = frame_file();
        frame.load(&file, FRAME_SIZE, Duration::from_millis(10)).unwrap();
        {
            let mut state = frame.state.write();
            state.count = 7;
            state.data.as_mut().unwrap()[0] = 0xEE;
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while frame.is_loaded() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!frame.is_loaded());
        assert_eq!(frame.count(), 7);

        let mut header = [0u8; 4];
        file.read_exact_at(0, &mut header).unwrap();
        assert_eq!(u32::from_le_bytes(header), 7);
    }

    #[test]
    fn test_touched_frame_stays_loaded() {
        let (file, frame, _dir) = frame_file();
        let lifetime = Duration::from_millis(150);
        frame.load(&file, FRAME_SIZE, lifetime).unwrap();

        for _ in 0..10 {
            std::thread::sleep(Duration::from_millis(30));
            frame.load(&file, FRAME_SIZE, lifetime).unwrap();
            assert!(frame.is_loaded());
        }
    }

    #[test]
    fn test_reload_after_eviction_spawns_again() {
        let (file, frame, _dir) = frame_file();
        frame.load(&file, FRAME_SIZE, Duration::from_millis(10)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while frame.is_loaded() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!frame.is_loaded());

        frame.load(&file, FRAME_SIZE, Duration::from_millis(10)).unwrap();
        assert!(frame.is_loaded());
    }
}
