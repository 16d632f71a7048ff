//! Shared fixtures for the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use rowmap::{FieldMeta, Row, RowSchema, ValueMeta};

/// `k: String, v: Integer`, the usual fold input.
pub fn kv_schema() -> Arc<RowSchema> {
    Arc::new(RowSchema::new(vec![
        FieldMeta::new("k", ValueMeta::string()),
        FieldMeta::new("v", ValueMeta::integer()),
    ]))
}

/// Key/value rows `(name_i, i)` for `i` in `0..count`.
pub fn kv_rows(count: usize) -> Vec<Row> {
    let schema = kv_schema();
    (0..count)
        .map(|i| {
            Row::new(
                Arc::clone(&schema),
                vec![format!("name_{}", i).into(), (i as i64).into()],
            )
            .unwrap()
        })
        .collect()
}

/// `id: Integer, m: Map<String, Integer>`, the usual unfold input.
pub fn map_schema() -> Arc<RowSchema> {
    Arc::new(RowSchema::new(vec![
        FieldMeta::new("id", ValueMeta::integer()),
        FieldMeta::new("m", ValueMeta::map(ValueMeta::string(), ValueMeta::integer())),
    ]))
}

/// Sort rows by their rendered cells so unordered map output can be compared.
pub fn sorted_texts(rows: &[Row]) -> Vec<Vec<Option<String>>> {
    let mut texts: Vec<Vec<Option<String>>> = rows
        .iter()
        .map(|row| {
            row.schema()
                .iter()
                .zip(row.values())
                .map(|(field, value)| field.meta.get_string(value).unwrap())
                .collect()
        })
        .collect();
    texts.sort();
    texts
}
