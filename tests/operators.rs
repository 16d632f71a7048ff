//! End-to-end tests for the fold and unfold operators wired through the
//! in-memory, channel and file-backed transports.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

mod common;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::Arc;
use std::thread;

use common::{kv_rows, kv_schema, map_schema, sorted_texts};
use rowmap::row::{RowStreamReader, RowStreamWriter, VecSink, VecSource, channel};
use rowmap::step::{FieldRole, FoldState, UnfoldState};
use rowmap::value::Storage;
use rowmap::{
    FieldMeta, FoldConfig, FoldOperator, MapValue, Row, RowSchema, StepError, StopFlag,
    TypeRegistry, UnfoldConfig, UnfoldOperator, Value, ValueMeta,
};

fn fold_all(rows: Vec<Row>) -> Row {
    let mut fold = FoldOperator::new(FoldConfig::new("k", "v", "m"));
    let mut sink = VecSink::new();
    fold.run(&mut VecSource::new(rows), &mut sink, &StopFlag::new())
        .into_result()
        .unwrap();
    let mut rows = sink.into_rows();
    assert_eq!(rows.len(), 1);
    rows.remove(0)
}

#[test]
fn test_fold_then_unfold_restores_pairs() -> Result<(), anyhow::Error> {
    let input = kv_rows(25);
    let folded = fold_all(input.clone());
    assert_eq!(
        folded.schema().field(0).map(|f| f.meta.to_string()),
        Some("Map<String, Integer>".to_string())
    );

    let mut unfold = UnfoldOperator::new(UnfoldConfig::new("m", "k", "v"));
    let mut sink = VecSink::new();
    let outcome = unfold
        .run(&mut VecSource::new(vec![folded]), &mut sink, &StopFlag::new())
        .into_result()?;
    assert_eq!(outcome.lines_read, 1);
    assert_eq!(outcome.lines_written, 25);
    assert_eq!(unfold.state(), UnfoldState::Done);

    // Same field names and types as the fold input.
    let output_schema = unfold.resolved_schema().unwrap();
    assert_eq!(output_schema.as_ref(), kv_schema().as_ref());
    assert_eq!(sorted_texts(sink.rows()), sorted_texts(&input));
    Ok(())
}

#[test]
fn test_pipeline_over_channels() -> Result<(), anyhow::Error> {
    let (fold_tx, mut fold_rx) = channel(4);
    let (unfold_tx, mut unfold_rx) = channel(4);
    let stop = StopFlag::new();

    let fold_stop = stop.clone();
    let folder = thread::spawn(move || {
        let mut tx = fold_tx;
        let mut fold = FoldOperator::new(FoldConfig::new("k", "v", "m"));
        fold.run(&mut VecSource::new(kv_rows(100)), &mut tx, &fold_stop)
    });
    let unfold_stop = stop.clone();
    let unfolder = thread::spawn(move || {
        let mut tx = unfold_tx;
        let mut unfold = UnfoldOperator::new(UnfoldConfig::new("m", "key", "value"));
        unfold.run(&mut fold_rx, &mut tx, &unfold_stop)
    });

    let mut collected = VecSink::new();
    while let Some(row) = rowmap::RowSource::next_row(&mut unfold_rx)? {
        rowmap::RowSink::emit(&mut collected, row)?;
    }

    let folded = folder.join().unwrap().into_result()?;
    let unfolded = unfolder.join().unwrap().into_result()?;
    assert_eq!(folded.lines_read, 100);
    assert_eq!(folded.lines_written, 1);
    assert_eq!(unfolded.lines_written, 100);
    assert_eq!(collected.rows().len(), 100);

    let names = collected.rows()[0].schema().names();
    assert_eq!(names, vec!["key", "value"]);
    Ok(())
}

#[test]
fn test_parallel_copies_are_independent() {
    let handles: Vec<_> = (1..=4)
        .map(|n| {
            thread::spawn(move || {
                let folded = fold_all(kv_rows(n * 10));
                folded.get(0).and_then(Value::as_map).map(MapValue::len)
            })
        })
        .collect();
    let sizes: Vec<Option<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(sizes, vec![Some(10), Some(20), Some(30), Some(40)]);
}

#[test]
fn test_fold_missing_value_field_emits_nothing() {
    let schema = Arc::new(RowSchema::new(vec![FieldMeta::new("k", ValueMeta::string())]));
    let rows = vec![Row::new(schema, vec!["a".into()]).unwrap()];

    let mut fold = FoldOperator::new(FoldConfig::new("k", "v", "m"));
    let mut sink = VecSink::new();
    let outcome = fold.run(&mut VecSource::new(rows), &mut sink, &StopFlag::new());

    assert!(outcome.has_errors());
    assert_eq!(outcome.errors, 1);
    assert!(sink.rows().is_empty());
    assert!(sink.is_finished());
    assert_eq!(fold.state(), FoldState::Failed);
    assert!(matches!(
        outcome.into_result(),
        Err(StepError::FieldNotFound { role: FieldRole::Value, .. })
    ));
}

#[test]
fn test_unfold_keeps_row_context() -> Result<(), anyhow::Error> {
    let schema = map_schema();
    let mut first = MapValue::new();
    first.insert("x", 1i64);
    first.insert("y", 2i64);
    let mut second = MapValue::new();
    second.insert("z", 3i64);
    let rows = vec![
        Row::new(Arc::clone(&schema), vec![10i64.into(), first.into()])?,
        Row::new(Arc::clone(&schema), vec![20i64.into(), Value::Null])?,
        Row::new(schema, vec![30i64.into(), second.into()])?,
    ];

    let mut unfold = UnfoldOperator::new(UnfoldConfig::new("m", "key", "value"));
    let mut sink = VecSink::new();
    let outcome = unfold
        .run(&mut VecSource::new(rows), &mut sink, &StopFlag::new())
        .into_result()?;
    assert_eq!(outcome.lines_read, 3);
    assert_eq!(outcome.lines_written, 3);

    let some = |s: &str| Some(s.to_string());
    assert_eq!(
        sorted_texts(sink.rows()),
        vec![
            vec![some("10"), some("x"), some("1")],
            vec![some("10"), some("y"), some("2")],
            vec![some("30"), some("z"), some("3")],
        ]
    );
    Ok(())
}

#[test]
fn test_unfold_indexed_map_cells() -> Result<(), anyhow::Error> {
    let map_meta = ValueMeta::map(ValueMeta::string(), ValueMeta::string())
        .with_storage(Storage::indexed(["{a=1,b=2}", "{c=3}"]));
    let schema = Arc::new(RowSchema::new(vec![FieldMeta::new("m", map_meta)]));
    let rows = vec![
        Row::new(Arc::clone(&schema), vec![Value::Index(1)])?,
        Row::new(schema, vec![Value::Index(0)])?,
    ];

    let mut unfold = UnfoldOperator::new(UnfoldConfig::new("m", "k", "v"));
    let mut sink = VecSink::new();
    unfold
        .run(&mut VecSource::new(rows), &mut sink, &StopFlag::new())
        .into_result()?;

    let some = |s: &str| Some(s.to_string());
    assert_eq!(
        sorted_texts(sink.rows()),
        vec![
            vec![some("a"), some("1")],
            vec![some("b"), some("2")],
            vec![some("c"), some("3")],
        ]
    );
    Ok(())
}

#[test]
fn test_fold_through_file_backed_stream() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("folded.rms");
    let registry = TypeRegistry::with_builtins();

    {
        let mut writer = RowStreamWriter::new(&registry, BufWriter::new(File::create(&path)?));
        let mut fold = FoldOperator::new(FoldConfig::new("k", "v", "m"));
        fold.run(&mut VecSource::new(kv_rows(50)), &mut writer, &StopFlag::new())
            .into_result()?;
        assert_eq!(writer.rows_written(), 1);
    }

    let mut reader = RowStreamReader::new(&registry, BufReader::new(File::open(&path)?));
    let mut unfold = UnfoldOperator::new(UnfoldConfig::new("m", "k", "v"));
    let mut sink = VecSink::new();
    let outcome = unfold
        .run(&mut reader, &mut sink, &StopFlag::new())
        .into_result()?;
    assert_eq!(outcome.lines_written, 50);
    assert_eq!(sorted_texts(sink.rows()), sorted_texts(&kv_rows(50)));
    Ok(())
}

#[test]
fn test_stop_before_start() {
    let stop = StopFlag::new();
    stop.request_stop();

    let mut fold = FoldOperator::new(FoldConfig::new("k", "v", "m"));
    let mut sink = VecSink::new();
    let outcome = fold.run(&mut VecSource::new(kv_rows(5)), &mut sink, &stop);
    assert!(outcome.stopped);
    assert!(!outcome.has_errors());
    assert!(sink.rows().is_empty());
    assert!(outcome.summary().ends_with("(stopped)"));
}
