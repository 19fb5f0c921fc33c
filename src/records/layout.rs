//! # Padded In-Memory Layout
//!
//! A packed row has no gaps; the in-memory form of the same row places each
//! column at a naturally aligned offset, the way `#[repr(C)]` lays out an
//! equivalent struct. This module computes that layout: per-column offsets,
//! the padding runs between them, and the final (tail-padded) size.
//!
//! The invariant `padded_size == row_size + sum(padding sizes)` holds by
//! construction: every column contributes exactly its disk width, and every
//! gap is recorded as a run.

use smallvec::SmallVec;

use super::types::Column;

/// A gap in the padded layout: `size` unused bytes starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingRun {
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedLayout {
    offsets: SmallVec<[usize; 8]>,
    paddings: SmallVec<[PaddingRun; 4]>,
    size: usize,
    max_align: usize,
}

impl PaddedLayout {
    /// Walks the columns in declaration order tracking the current offset
    /// and the largest alignment seen; each column is placed at the next
    /// multiple of its alignment, and the trailing edge is padded up to the
    /// overall alignment.
    pub fn compute(columns: &[Column]) -> Self {
        let mut offsets = SmallVec::new();
        let mut paddings = SmallVec::new();
        let mut current = 0usize;
        let mut max_align = 1usize;

        for col in columns {
            let align = col.data_type.alignment();
            max_align = max_align.max(align);

            let aligned = current.next_multiple_of(align);
            if aligned > current {
                paddings.push(PaddingRun {
                    offset: current,
                    size: aligned - current,
                });
            }
            offsets.push(aligned);
            current = aligned + col.disk_width();
        }

        let size = current.next_multiple_of(max_align);
        if size > current {
            paddings.push(PaddingRun {
                offset: current,
                size: size - current,
            });
        }

        Self {
            offsets,
            paddings,
            size,
            max_align,
        }
    }

    /// Padded offset of column `idx`.
    pub fn offset(&self, idx: usize) -> usize {
        self.offsets[idx]
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn paddings(&self) -> &[PaddingRun] {
        &self.paddings
    }

    /// Total padded size, including the tail run.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_align(&self) -> usize {
        self.max_align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::types::DataType;

    fn layout_of(cols: &[Column]) -> PaddedLayout {
        PaddedLayout::compute(cols)
    }

    #[test]
    fn test_no_padding_when_fields_tile() {
        let cols = [
            Column::new("a", DataType::Int32),
            Column::new("b", DataType::Float32),
            Column::new("c", DataType::Int64),
        ];
        let layout = layout_of(&cols);
        assert_eq!(layout.offsets(), &[0, 4, 8]);
        assert!(layout.paddings().is_empty());
        assert_eq!(layout.size(), 16);
        assert_eq!(layout.max_align(), 8);
    }

    #[test]
    fn test_gap_before_wider_field() {
        // i8 then i32: three bytes of padding at offset 1, same as #[repr(C)].
        let cols = [
            Column::new("flag", DataType::Int8),
            Column::new("id", DataType::Int32),
        ];
        let layout = layout_of(&cols);
        assert_eq!(layout.offsets(), &[0, 4]);
        assert_eq!(layout.paddings(), &[PaddingRun { offset: 1, size: 3 }]);
        assert_eq!(layout.size(), 8);
    }

    #[test]
    fn test_tail_padding_to_max_alignment() {
        // i64 then i8: seven bytes of tail padding.
        let cols = [
            Column::new("id", DataType::Int64),
            Column::new("flag", DataType::Int8),
        ];
        let layout = layout_of(&cols);
        assert_eq!(layout.offsets(), &[0, 8]);
        assert_eq!(layout.paddings(), &[PaddingRun { offset: 9, size: 7 }]);
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn test_array_column_advances_by_full_width() {
        let cols = [
            Column::with_count("name", DataType::Char, 5),
            Column::new("id", DataType::Int16),
        ];
        let layout = layout_of(&cols);
        assert_eq!(layout.offsets(), &[0, 6]);
        assert_eq!(layout.paddings(), &[PaddingRun { offset: 5, size: 1 }]);
        assert_eq!(layout.size(), 8);
    }

    #[test]
    fn test_padded_size_is_row_size_plus_paddings() {
        let cols = [
            Column::new("a", DataType::Char),
            Column::new("b", DataType::Int64),
            Column::with_count("c", DataType::Int16, 3),
            Column::new("d", DataType::Char),
        ];
        let layout = layout_of(&cols);
        let row_size: usize = cols.iter().map(|c| c.disk_width()).sum();
        let padding: usize = layout.paddings().iter().map(|p| p.size).sum();
        assert_eq!(layout.size(), row_size + padding);
    }

    #[test]
    fn test_matches_repr_c() {
        #[repr(C)]
        struct Probe {
            flag: i8,
            id: i32,
            qty: i64,
            tail: u8,
        }
        let cols = [
            Column::new("flag", DataType::Int8),
            Column::new("id", DataType::Int32),
            Column::new("qty", DataType::Int64),
            Column::new("tail", DataType::Char),
        ];
        let layout = layout_of(&cols);
        assert_eq!(layout.size(), std::mem::size_of::<Probe>());
        assert_eq!(layout.offset(0), std::mem::offset_of!(Probe, flag));
        assert_eq!(layout.offset(1), std::mem::offset_of!(Probe, id));
        assert_eq!(layout.offset(2), std::mem::offset_of!(Probe, qty));
        assert_eq!(layout.offset(3), std::mem::offset_of!(Probe, tail));
    }
}
