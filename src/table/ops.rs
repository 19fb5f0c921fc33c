//! # Row Operations
//!
//! CRUD and predicate scans over the frame vector.
//!
//! Insertion targets the first frame with spare capacity, appending a new
//! frame only when every existing one is full. Index reads walk the frames
//! accumulating counts and load only the frame that holds the target row.
//! Predicate removal re-examines the same slot after a hit, because the
//! tail shifted left into it; string payloads of a deleted row are released
//! to the heap before the shift.
//!
//! Scans hold a frame's lock shared while unpacking and take the exclusive
//! lock only for the mutation itself, releasing the shared lock in between
//! (the lock is not upgradable in place).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use eyre::Result;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::error::StoreError;
use crate::parsing::{self, AddResult};
use crate::records::Row;
use crate::storage::{Frame, FrameState};

use super::Table;

impl Table {
    /// Appends one row.
    pub fn add_element(&self, row: &Row) -> Result<()> {
        let mut packed = vec![0u8; self.row_size];
        self.schema.pack_row(row, &mut packed)?;
        let payloads = self.schema.string_payloads(row)?;
        self.insert_packed(&mut packed, &payloads)
    }

    /// Appends rows one by one, stopping at the first failure.
    pub fn add_elements(&self, rows: &[Row]) -> Result<()> {
        for row in rows {
            self.add_element(row)?;
        }
        Ok(())
    }

    /// Parses a textual insert query and appends the resulting rows.
    pub fn add(&self, query: &str) -> Result<AddResult> {
        let rows = parsing::parse_rows(&self.schema, query)?;
        let rows_added = rows.len();
        for row in &rows {
            self.add_element(row)?;
        }
        Ok(AddResult { rows_added })
    }

    /// Returns the row at `index` in frame order.
    pub fn get_element(&self, index: usize) -> Result<Row> {
        let (frame, local) = self.locate(index)?;
        self.with_frame_read(&frame, |state| {
            if local >= state.count as usize {
                return Err(StoreError::OutOfRange(format!(
                    "row {index} disappeared during the read"
                ))
                .into());
            }
            self.unpack_at(state, local)
        })?
    }

    /// Every row, in frame order then slot order.
    pub fn get_all(&self) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(self.row_count());
        for frame in self.frame_snapshot() {
            self.with_frame_read(&frame, |state| -> Result<()> {
                for i in 0..state.count as usize {
                    out.push(self.unpack_at(state, i)?);
                }
                Ok(())
            })??;
        }
        Ok(out)
    }

    /// First row satisfying `pred`, or `NotFound`.
    pub fn find_first<P: Fn(&Row) -> bool>(&self, pred: P) -> Result<Row> {
        self.scan_find(&pred, Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| eyre::Report::new(StoreError::NotFound))
    }

    /// Up to `count` rows satisfying `pred`, in scan order.
    pub fn find<P: Fn(&Row) -> bool>(&self, pred: P, count: usize) -> Result<Vec<Row>> {
        self.scan_find(&pred, Some(count))
    }

    /// All rows satisfying `pred`.
    pub fn find_all<P: Fn(&Row) -> bool>(&self, pred: P) -> Result<Vec<Row>> {
        self.scan_find(&pred, None)
    }

    /// Removes and returns the first row satisfying `pred`, or `NotFound`.
    pub fn pop_first<P: Fn(&Row) -> bool>(&self, pred: P) -> Result<Row> {
        self.scan_remove(&pred, Some(1), true)?
            .into_iter()
            .next()
            .ok_or_else(|| eyre::Report::new(StoreError::NotFound))
    }

    /// Removes and returns up to `count` rows satisfying `pred`.
    pub fn pop<P: Fn(&Row) -> bool>(&self, pred: P, count: usize) -> Result<Vec<Row>> {
        self.scan_remove(&pred, Some(count), true)
    }

    /// Removes and returns every row satisfying `pred`.
    pub fn pop_all<P: Fn(&Row) -> bool>(&self, pred: P) -> Result<Vec<Row>> {
        self.scan_remove(&pred, None, true)
    }

    /// Removes up to `count` rows satisfying `pred`.
    pub fn remove<P: Fn(&Row) -> bool>(&self, pred: P, count: usize) -> Result<()> {
        self.scan_remove(&pred, Some(count), false).map(|_| ())
    }

    /// Removes every row satisfying `pred`.
    pub fn remove_all<P: Fn(&Row) -> bool>(&self, pred: P) -> Result<()> {
        self.scan_remove(&pred, None, false).map(|_| ())
    }

    /// Removes all rows, truncates the strings heap, and resets the data
    /// file to a fresh metadata header.
    pub fn clear(&self) -> Result<()> {
        self.frames.write().clear();
        self.elements.store(0, Ordering::Relaxed);
        self.file.set_len(0)?;
        self.write_metadata()?;
        if let Some(heap) = &self.strings {
            heap.truncate()?;
        }
        Ok(())
    }

    /// Appends a `#[repr(C)]` record (string-free schemas only).
    pub fn add_record<R: IntoBytes + Immutable>(&self, record: &R) -> Result<()> {
        let mut packed = vec![0u8; self.row_size];
        self.schema.pack_record(record, &mut packed)?;
        self.insert_packed(&mut packed, &[])
    }

    /// Reads the row at `index` back as a `#[repr(C)]` record.
    pub fn get_record<R: FromBytes>(&self, index: usize) -> Result<R> {
        let (frame, local) = self.locate(index)?;
        let packed = self.with_frame_read(&frame, |state| -> Result<Vec<u8>> {
            if local >= state.count as usize {
                return Err(StoreError::OutOfRange(format!(
                    "row {index} disappeared during the read"
                ))
                .into());
            }
            let at = local * self.row_size;
            let data = state
                .data
                .as_ref()
                .expect("frame is loaded inside with_frame_read"); // INVARIANT: with_frame_read only runs the closure on loaded frames
            Ok(data[at..at + self.row_size].to_vec())
        })??;
        self.schema.unpack_record(&packed)
    }

    fn insert_packed(&self, packed: &mut [u8], payloads: &[&[u8]]) -> Result<()> {
        for frame in self.frame_snapshot() {
            if self.try_insert(&frame, packed, payloads)? {
                return Ok(());
            }
        }
        let frame = self.add_frame()?;
        if self.try_insert(&frame, packed, payloads)? {
            return Ok(());
        }
        Err(StoreError::Corruption("freshly appended frame rejected a row".into()).into())
    }

    fn try_insert(&self, frame: &Arc<Frame>, packed: &mut [u8], payloads: &[&[u8]]) -> Result<bool> {
        // Cheap capacity probe before paging the frame in. The count stays
        // valid while evicted, so a full frame is skipped without I/O.
        if frame.count() >= self.frame_capacity as u32 {
            return Ok(false);
        }
        self.with_frame_write(frame, |state| -> Result<bool> {
            if state.count >= self.frame_capacity as u32 {
                return Ok(false);
            }

            // Frame lock first, strings lock second; never the other way.
            let mut added: Vec<(u64, u32)> = Vec::new();
            for (&slot, payload) in self.schema.string_slots().iter().zip(payloads) {
                match self.heap().add(payload) {
                    Ok(offset) => {
                        packed[slot + 4..slot + 12].copy_from_slice(&offset.to_le_bytes());
                        if !payload.is_empty() {
                            added.push((offset, payload.len() as u32));
                        }
                    }
                    Err(err) => {
                        for (offset, len) in added.drain(..) {
                            let _ = self.heap().remove(offset, len);
                        }
                        return Err(err);
                    }
                }
            }

            let at = state.count as usize * self.row_size;
            let data = state
                .data
                .as_mut()
                .expect("frame is loaded inside with_frame_write"); // INVARIANT: with_frame_write only runs the closure on loaded frames
            data[at..at + self.row_size].copy_from_slice(packed);
            state.count += 1;
            self.elements.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        })?
    }

    /// Maps a table-wide index to `(frame, slot within frame)`.
    fn locate(&self, index: usize) -> Result<(Arc<Frame>, usize)> {
        if index >= self.row_count() {
            return Err(StoreError::OutOfRange(format!(
                "index {index} with {} rows",
                self.row_count()
            ))
            .into());
        }
        let mut cumulative = 0usize;
        for frame in self.frame_snapshot() {
            let count = frame.count() as usize;
            if cumulative + count > index {
                return Ok((frame, index - cumulative));
            }
            cumulative += count;
        }
        Err(StoreError::OutOfRange(format!(
            "index {index} with {} rows",
            self.row_count()
        ))
        .into())
    }

    fn unpack_at(&self, state: &FrameState, local: usize) -> Result<Row> {
        let at = local * self.row_size;
        let data = state
            .data
            .as_ref()
            .expect("frame is loaded inside with_frame_read"); // INVARIANT: with_frame_read only runs the closure on loaded frames
        let packed = &data[at..at + self.row_size];
        self.schema
            .unpack_row(packed, |len, offset| self.heap().get(offset, len))
    }

    fn scan_find(&self, pred: &impl Fn(&Row) -> bool, limit: Option<usize>) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        if limit == Some(0) {
            return Ok(out);
        }
        for frame in self.frame_snapshot() {
            let done = self.with_frame_read(&frame, |state| -> Result<bool> {
                for i in 0..state.count as usize {
                    let row = self.unpack_at(state, i)?;
                    if pred(&row) {
                        out.push(row);
                        if limit.is_some_and(|k| out.len() >= k) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            })??;
            if done {
                break;
            }
        }
        Ok(out)
    }

    fn scan_remove(
        &self,
        pred: &impl Fn(&Row) -> bool,
        limit: Option<usize>,
        collect: bool,
    ) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        let mut removed = 0usize;
        if limit == Some(0) {
            return Ok(out);
        }

        'frames: for frame in self.frame_snapshot() {
            let mut i = 0usize;
            loop {
                let candidate = self.with_frame_read(&frame, |state| -> Result<Option<Row>> {
                    if i >= state.count as usize {
                        return Ok(None);
                    }
                    Ok(Some(self.unpack_at(state, i)?))
                })??;
                let Some(row) = candidate else { break };
                if !pred(&row) {
                    i += 1;
                    continue;
                }

                let deleted = self.with_frame_write(&frame, |state| -> Result<bool> {
                    if i >= state.count as usize {
                        return Ok(false);
                    }
                    self.delete_at(state, i)?;
                    Ok(true)
                })??;
                if deleted {
                    self.elements.fetch_sub(1, Ordering::Relaxed);
                    removed += 1;
                    if collect {
                        out.push(row);
                    }
                    // The tail shifted into slot i; re-examine it.
                    if limit.is_some_and(|k| removed >= k) {
                        break 'frames;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Releases the slot's string payloads, then shifts the tail one row
    /// to the left and decrements the frame count.
    fn delete_at(&self, state: &mut FrameState, local: usize) -> Result<()> {
        let rs = self.row_size;
        let at = local * rs;

        if let Some(heap) = self.strings.as_ref() {
            let data = state
                .data
                .as_ref()
                .expect("frame is loaded inside with_frame_write"); // INVARIANT: with_frame_write only runs the closure on loaded frames
            let packed = &data[at..at + rs];
            for &slot in self.schema.string_slots() {
                let len = u32::from_le_bytes([
                    packed[slot],
                    packed[slot + 1],
                    packed[slot + 2],
                    packed[slot + 3],
                ]);
                let offset = u64::from_le_bytes([
                    packed[slot + 4],
                    packed[slot + 5],
                    packed[slot + 6],
                    packed[slot + 7],
                    packed[slot + 8],
                    packed[slot + 9],
                    packed[slot + 10],
                    packed[slot + 11],
                ]);
                if len > 0 {
                    heap.remove(offset, len)?;
                }
            }
        }

        let count = state.count as usize;
        let data = state
            .data
            .as_mut()
            .expect("frame is loaded inside with_frame_write"); // INVARIANT: with_frame_write only runs the closure on loaded frames
        data.copy_within(at + rs..count * rs, at);
        state.count -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::records::{Row, Schema, Value};
    use crate::table::Table;

    fn products_table(dir: &std::path::Path) -> Table {
        let schema = Schema::parse("|id:INT32|name:STRING|price:FLOAT32|").unwrap();
        Table::create(dir.join("products"), schema).unwrap()
    }

    fn product(id: i32, name: &str, price: f32) -> Row {
        Row::new(vec![
            Value::Int32(id),
            Value::Str(name.into()),
            Value::Float32(price),
        ])
    }

    #[test]
    fn test_add_and_get_roundtrip() {
        let dir = tempdir().unwrap();
        let table = products_table(dir.path());

        table.add_element(&product(1, "Intel", 589.99)).unwrap();
        table.add_element(&product(2, "AMD", 699.99)).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get_element(0).unwrap(), product(1, "Intel", 589.99));
        assert_eq!(table.get_element(1).unwrap(), product(2, "AMD", 699.99));
        assert!(table.get_element(2).is_err());
    }

    #[test]
    fn test_pop_first_shifts_and_frees() {
        let dir = tempdir().unwrap();
        let table = products_table(dir.path());
        for (id, name, price) in [(1, "Intel", 589.99), (2, "AMD", 699.99), (3, "NVIDIA", 1599.99)]
        {
            table.add_element(&product(id, name, price)).unwrap();
        }

        let popped = table
            .pop_first(|row| row.get(0).unwrap().as_i64() == Some(2))
            .unwrap();
        assert_eq!(popped, product(2, "AMD", 699.99));
        assert_eq!(table.row_count(), 2);

        let rest = table.get_all().unwrap();
        assert_eq!(rest[0], product(1, "Intel", 589.99));
        assert_eq!(rest[1], product(3, "NVIDIA", 1599.99));
    }

    #[test]
    fn test_remove_all_with_adjacent_matches() {
        let dir = tempdir().unwrap();
        let table = products_table(dir.path());
        for (id, name) in [(1, "keep"), (2, "drop"), (2, "drop"), (2, "drop"), (3, "keep")] {
            table.add_element(&product(id, name, 1.0)).unwrap();
        }

        table
            .remove_all(|row| row.get(0).unwrap().as_i64() == Some(2))
            .unwrap();
        assert_eq!(table.row_count(), 2);
        assert!(table
            .find_all(|row| row.get(0).unwrap().as_i64() == Some(2))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_find_respects_count_limit() {
        let dir = tempdir().unwrap();
        let table = products_table(dir.path());
        for id in 0..10 {
            table.add_element(&product(id, "x", 0.0)).unwrap();
        }

        let some = table.find(|_| true, 4).unwrap();
        assert_eq!(some.len(), 4);
        assert!(table.find(|_| true, 0).unwrap().is_empty());
        let all = table.find_all(|_| true).unwrap();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_clear_resets_table_and_heap() {
        let dir = tempdir().unwrap();
        let table = products_table(dir.path());
        table.add_element(&product(1, "Intel", 589.99)).unwrap();
        table.clear().unwrap();

        assert_eq!(table.row_count(), 0);
        assert_eq!(table.frame_count(), 0);
        assert!(table.get_all().unwrap().is_empty());

        table.add_element(&product(9, "fresh", 1.0)).unwrap();
        assert_eq!(table.get_element(0).unwrap(), product(9, "fresh", 1.0));
    }
}
