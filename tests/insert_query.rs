//! The textual insert surface end-to-end: `Table::add` parsing, range
//! checks, arrays, and failure atomicity.

use tempfile::tempdir;

use framedb::{Row, Schema, StoreError, Table, Value};

fn products_table(dir: &std::path::Path) -> Table {
    let schema = Schema::parse("|id:INT32|name:STRING|price:FLOAT32|").unwrap();
    Table::create(dir.join("products"), schema).unwrap()
}

#[test]
fn multi_row_insert() {
    let dir = tempdir().unwrap();
    let table = products_table(dir.path());

    let result = table
        .add("(1, 'Intel', 589.99), (2, 'AMD', 699.99)")
        .unwrap();
    assert_eq!(result.rows_added, 2);
    assert_eq!(table.row_count(), 2);

    let rows = table.get_all().unwrap();
    assert_eq!(
        rows[0],
        Row::new(vec![
            Value::Int32(1),
            Value::Str("Intel".into()),
            Value::Float32(589.99),
        ])
    );
    assert_eq!(
        rows[1],
        Row::new(vec![
            Value::Int32(2),
            Value::Str("AMD".into()),
            Value::Float32(699.99),
        ])
    );
}

#[test]
fn single_row_insert() {
    let dir = tempdir().unwrap();
    let table = products_table(dir.path());

    let result = table.add("1,'x',9").unwrap();
    assert_eq!(result.rows_added, 1);
    assert_eq!(
        table.get_element(0).unwrap(),
        Row::new(vec![
            Value::Int32(1),
            Value::Str("x".into()),
            Value::Float32(9.0),
        ])
    );
}

#[test]
fn unterminated_quote_fails() {
    let dir = tempdir().unwrap();
    let table = products_table(dir.path());

    let err = table.add("1, 'unterminated, 2").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::InvalidQuery(_))
    ));
    assert_eq!(table.row_count(), 0);
}

#[test]
fn a_bad_row_aborts_the_whole_insert() {
    let dir = tempdir().unwrap();
    let table = products_table(dir.path());

    // The second row is malformed; the valid first row must not land.
    let err = table.add("(1, 'ok', 1.0), (2, 'bad')").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::InvalidQuery(_))
    ));
    assert_eq!(table.row_count(), 0);
}

#[test]
fn integer_range_is_enforced() {
    let dir = tempdir().unwrap();
    let schema = Schema::parse("|v:INT8|").unwrap();
    let table = Table::create(dir.path().join("bytes"), schema).unwrap();

    table.add("127").unwrap();
    table.add("-128").unwrap();
    assert!(table.add("128").is_err());
    assert!(table.add("--1").is_err());
    assert_eq!(table.row_count(), 2);
}

#[test]
fn quoted_bytes_are_preserved() {
    let dir = tempdir().unwrap();
    let table = products_table(dir.path());

    table.add(r#"5, "it's a 'test'", 0"#).unwrap();
    assert_eq!(
        table.get_element(0).unwrap().get(1).unwrap().as_str(),
        Some("it's a 'test'")
    );
}

#[test]
fn array_columns_through_the_query_surface() {
    let dir = tempdir().unwrap();
    let schema = Schema::parse("|id:INT32|tags:INT16[4]|").unwrap();
    let table = Table::create(dir.path().join("tagged"), schema).unwrap();

    table.add("7, {1, 2}").unwrap();
    let row = table.get_element(0).unwrap();
    assert_eq!(
        row.get(1).unwrap().as_array().unwrap(),
        &[
            Value::Int16(1),
            Value::Int16(2),
            Value::Int16(0),
            Value::Int16(0),
        ]
    );

    assert!(table.add("8, {1, 2, 3, 4, 5}").is_err());
    assert!(table.add("9, {1, 2]").is_err());
}

#[test]
fn char_array_filled_from_a_string() {
    let dir = tempdir().unwrap();
    let schema = Schema::parse("|name:CHAR[8]|").unwrap();
    let table = Table::create(dir.path().join("names"), schema).unwrap();

    table.add("'Intel'").unwrap();
    let row = table.get_element(0).unwrap();
    let chars = row.get(0).unwrap().as_array().unwrap();
    assert_eq!(chars[0], Value::Char(b'I'));
    assert_eq!(chars[4], Value::Char(b'l'));
    assert_eq!(chars[5], Value::Char(0));
}

#[test]
fn arity_mismatch_fails() {
    let dir = tempdir().unwrap();
    let table = products_table(dir.path());

    assert!(table.add("1, 'x'").is_err());
    assert!(table.add("1, 'x', 2, 3").is_err());
    assert_eq!(table.row_count(), 0);
}
