//! # Schema
//!
//! An ordered column list together with every derived table the engine
//! needs: packed offsets and widths, the padded layout, and the offsets of
//! string slots inside a packed row. Derived tables are rebuilt whenever a
//! column is added, so lookups during packing are plain indexed reads.
//!
//! ## Canonical Text
//!
//! A schema serializes to `|name:TYPE|name:TYPE[count]|…|`; the `[count]`
//! suffix is omitted when the count is 1. The text round-trips through
//! [`Schema::parse`] to an equal schema, and it is what the metadata header
//! stores.

use eyre::Result;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::StoreError;

use super::layout::PaddedLayout;
use super::types::{Column, DataType};

#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    disk_offsets: SmallVec<[usize; 8]>,
    disk_widths: SmallVec<[usize; 8]>,
    string_slots: SmallVec<[usize; 4]>,
    row_size: usize,
    layout: PaddedLayout,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut schema = Self {
            columns: Vec::new(),
            by_name: HashMap::new(),
            disk_offsets: SmallVec::new(),
            disk_widths: SmallVec::new(),
            string_slots: SmallVec::new(),
            row_size: 0,
            layout: PaddedLayout::compute(&[]),
        };
        for col in columns {
            schema.push_column(col)?;
        }
        schema.rebuild();
        Ok(schema)
    }

    /// Parses canonical schema text. Surrounding bars are optional and
    /// whitespace around entries is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut columns = Vec::new();
        for entry in text.split('|') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (name, type_part) = entry.split_once(':').ok_or_else(|| {
                StoreError::InvalidSchema(format!("entry '{entry}' is missing ':'"))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(
                    StoreError::InvalidSchema(format!("entry '{entry}' has no column name")).into(),
                );
            }

            let type_part = type_part.trim();
            let (token, count) = match type_part.split_once('[') {
                Some((token, rest)) => {
                    let inner = rest.strip_suffix(']').ok_or_else(|| {
                        StoreError::InvalidSchema(format!("entry '{entry}' has an unclosed '['"))
                    })?;
                    let inner = inner.trim();
                    let count = if inner.is_empty() {
                        1
                    } else {
                        inner.parse::<usize>().map_err(|_| {
                            StoreError::InvalidSchema(format!(
                                "entry '{entry}' has a non-numeric count '{inner}'"
                            ))
                        })?
                    };
                    (token.trim(), count)
                }
                None => (type_part, 1),
            };

            let data_type = DataType::from_token(token).ok_or_else(|| {
                StoreError::InvalidSchema(format!("unknown type '{token}' in entry '{entry}'"))
            })?;
            columns.push(Column::with_count(name, data_type, count));
        }
        Self::new(columns)
    }

    /// Appends a column on the right of the existing ones.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        count: usize,
    ) -> Result<()> {
        self.push_column(Column::with_count(name, data_type, count))?;
        self.rebuild();
        Ok(())
    }

    fn push_column(&mut self, col: Column) -> Result<()> {
        if col.name.is_empty() {
            return Err(StoreError::InvalidSchema("column name must not be empty".into()).into());
        }
        if col.count < 1 {
            return Err(StoreError::InvalidSchema(format!(
                "column '{}' has count {}, expected at least 1",
                col.name, col.count
            ))
            .into());
        }
        if self.by_name.contains_key(&col.name) {
            return Err(StoreError::InvalidSchema(format!(
                "column '{}' already exists",
                col.name
            ))
            .into());
        }
        self.by_name.insert(col.name.clone(), self.columns.len());
        self.columns.push(col);
        Ok(())
    }

    fn rebuild(&mut self) {
        self.disk_offsets.clear();
        self.disk_widths.clear();
        self.string_slots.clear();

        let mut offset = 0usize;
        for col in &self.columns {
            self.disk_offsets.push(offset);
            self.disk_widths.push(col.disk_width());
            if col.data_type.is_string() {
                for i in 0..col.count {
                    self.string_slots
                        .push(offset + i * col.data_type.disk_size());
                }
            }
            offset += col.disk_width();
        }
        self.row_size = offset;
        self.layout = PaddedLayout::compute(&self.columns);
    }

    /// The canonical `|name:TYPE[count]|…|` form stored in table metadata.
    pub fn canonical(&self) -> String {
        let mut out = String::from("|");
        for col in &self.columns {
            out.push_str(&col.name);
            out.push(':');
            out.push_str(col.data_type.token());
            if col.count > 1 {
                out.push('[');
                out.push_str(&col.count.to_string());
                out.push(']');
            }
            out.push('|');
        }
        out
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Packed byte length of one row.
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Packed offset of column `idx`.
    pub fn disk_offset(&self, idx: usize) -> usize {
        self.disk_offsets[idx]
    }

    /// Packed byte width of column `idx` (element size times count).
    pub fn disk_width(&self, idx: usize) -> usize {
        self.disk_widths[idx]
    }

    /// Byte offsets of every string slot inside a packed row, in column
    /// order and element order.
    pub fn string_slots(&self) -> &[usize] {
        &self.string_slots
    }

    pub fn has_strings(&self) -> bool {
        !self.string_slots.is_empty()
    }

    pub fn padded_layout(&self) -> &PaddedLayout {
        &self.layout
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_canonical_roundtrip() {
        let text = "|id:INT32|name:STRING|price:FLOAT32|";
        let schema = Schema::parse(text).unwrap();
        assert_eq!(schema.canonical(), text);
        assert_eq!(Schema::parse(&schema.canonical()).unwrap(), schema);
    }

    #[test]
    fn test_derived_tables_for_spec_schema() {
        let schema = Schema::parse("|id:INT32|name:STRING|price:FLOAT32|").unwrap();
        assert_eq!(schema.row_size(), 4 + 12 + 4);
        assert_eq!(schema.string_slots(), &[4]);
        assert_eq!(schema.disk_offset(2), 16);
        assert!(schema.has_strings());
    }

    #[test]
    fn test_count_suffix_omitted_when_one() {
        let mut schema = Schema::new(Vec::new()).unwrap();
        schema.add_column("tag", DataType::Char, 1).unwrap();
        schema.add_column("buf", DataType::Char, 16).unwrap();
        assert_eq!(schema.canonical(), "|tag:CHAR|buf:CHAR[16]|");
    }

    #[test]
    fn test_string_array_produces_one_slot_per_element() {
        let schema = Schema::parse("|id:INT8|aliases:STRING[3]|").unwrap();
        assert_eq!(schema.string_slots(), &[1, 13, 25]);
        assert_eq!(schema.row_size(), 1 + 3 * 12);
    }

    #[test]
    fn test_row_size_is_sum_of_column_widths() {
        let schema = Schema::parse("|a:CHAR[7]|b:INT64|c:WCHAR[2]|").unwrap();
        let total: usize = schema.columns().iter().map(|c| c.disk_width()).sum();
        assert_eq!(schema.row_size(), total);
        assert_eq!(schema.row_size(), 7 + 8 + 4);
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let err = Schema::parse("|id:INT32|id:INT64|").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_rejects_empty_name_and_zero_count() {
        assert!(Schema::parse("|:INT32|").is_err());
        assert!(Schema::parse("|id:INT32[0]|").is_err());
        let mut schema = Schema::new(Vec::new()).unwrap();
        assert!(schema.add_column("", DataType::Char, 1).is_err());
        assert!(schema.add_column("x", DataType::Char, 0).is_err());
    }

    #[test]
    fn test_rejects_unknown_type_and_missing_colon() {
        assert!(Schema::parse("|id:TEXT|").is_err());
        assert!(Schema::parse("|id|").is_err());
        assert!(Schema::parse("|id:INT32[|").is_err());
    }

    #[test]
    fn test_empty_bracket_defaults_to_one() {
        let schema = Schema::parse("|id:INT32[]|").unwrap();
        assert_eq!(schema.column(0).unwrap().count, 1);
    }

    #[test]
    fn test_parse_without_surrounding_bars() {
        let schema = Schema::parse("id:INT32|name:STRING").unwrap();
        assert_eq!(schema.column_count(), 2);
        assert_eq!(schema.column_index("name"), Some(1));
    }
}
