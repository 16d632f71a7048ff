//! Fold: many key/value rows into one map cell.

use std::sync::Arc;

use super::error::{FieldRole, StepError};
use super::{CheckRemark, StepOutcome, StopFlag, report_progress};
use crate::logging::{debug, error, info, trace, warn};
use crate::row::{FieldMeta, Row, RowSchema, RowSink, RowSource};
use crate::value::{MapValue, Value, ValueMeta};

const STEP_NAME: &str = "fold";

/// Fields read by a [`FoldOperator`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
pub struct FoldConfig {
    /// Input field providing map keys.
    pub key_field: String,
    /// Input field providing map values.
    pub value_field: String,
    /// Name of the single output field.
    pub map_field: String,
    /// Log progress every this many rows.
    #[cfg_attr(feature = "config", serde(default))]
    pub feedback_interval: Option<u64>,
}

impl FoldConfig {
    pub fn new(
        key_field: impl Into<String>,
        value_field: impl Into<String>,
        map_field: impl Into<String>,
    ) -> Self {
        Self {
            key_field: key_field.into(),
            value_field: value_field.into(),
            map_field: map_field.into(),
            feedback_interval: None,
        }
    }

    pub fn with_feedback_interval(mut self, interval: u64) -> Self {
        self.feedback_interval = Some(interval);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldState {
    Init,
    Accumulating,
    Flushing,
    Done,
    Failed,
}

/// Accumulates `key_field -> value_field` from every input row and emits a
/// single row holding the resulting map once the input ends.
///
/// A repeated key keeps the value of its last row. Zero input rows still
/// produce one row, with an empty map.
#[derive(Debug)]
pub struct FoldOperator {
    config: FoldConfig,
    state: FoldState,
    map: MapValue,
    key_meta: Option<ValueMeta>,
    value_meta: Option<ValueMeta>,
}

impl FoldOperator {
    pub fn new(config: FoldConfig) -> Self {
        Self {
            config,
            state: FoldState::Init,
            map: MapValue::new(),
            key_meta: None,
            value_meta: None,
        }
    }

    pub fn config(&self) -> &FoldConfig {
        &self.config
    }

    pub fn state(&self) -> FoldState {
        self.state
    }

    /// Entries accumulated so far.
    pub fn map(&self) -> &MapValue {
        &self.map
    }

    /// Validate the configuration and start accumulating.
    pub fn init(&mut self) -> Result<(), StepError> {
        match self.state {
            FoldState::Init => {}
            FoldState::Accumulating => return Ok(()),
            _ => return Err(StepError::AlreadyFinished),
        }
        if self.config.map_field.trim().is_empty() {
            self.state = FoldState::Failed;
            return Err(StepError::Config("map field name is empty".into()));
        }
        self.map = MapValue::new();
        self.state = FoldState::Accumulating;
        debug!(
            key = %self.config.key_field,
            value = %self.config.value_field,
            map = %self.config.map_field,
            "fold initialised"
        );
        Ok(())
    }

    /// Add one row's key/value pair to the map.
    ///
    /// Fields are looked up by name in the row's own schema. Stored values
    /// are converted to their native form first.
    pub fn accumulate(&mut self, row: &Row) -> Result<(), StepError> {
        self.init()?;
        self.accumulate_row(row).inspect_err(|_| self.state = FoldState::Failed)
    }

    fn accumulate_row(&mut self, row: &Row) -> Result<(), StepError> {
        let (key_meta, key) = native_cell(row, FieldRole::Key, &self.config.key_field)?;
        let (value_meta, value) = native_cell(row, FieldRole::Value, &self.config.value_field)?;
        trace!(key = ?key, value = ?value, "fold entry");
        self.map.insert(key, value);
        self.key_meta = Some(key_meta);
        self.value_meta = Some(value_meta);
        Ok(())
    }

    /// Build the single output row and finish.
    pub fn flush(&mut self) -> Result<Row, StepError> {
        self.init()?;
        self.state = FoldState::Flushing;
        let map_meta = ValueMeta::map(
            self.key_meta.take().unwrap_or_default(),
            self.value_meta.take().unwrap_or_default(),
        );
        let schema = Arc::new(RowSchema::new(vec![FieldMeta::new(
            self.config.map_field.clone(),
            map_meta,
        )]));
        let map = std::mem::take(&mut self.map);
        match Row::new(schema, vec![map.into()]) {
            Ok(row) => {
                self.state = FoldState::Done;
                Ok(row)
            }
            Err(e) => {
                self.state = FoldState::Failed;
                Err(e.into())
            }
        }
    }

    /// Schema of the output row for a given input schema.
    pub fn output_schema(&self, input: &RowSchema) -> RowSchema {
        let element = |name: &str| {
            input
                .field_by_name(name)
                .map(|f| f.meta.as_normal())
                .unwrap_or_default()
        };
        RowSchema::new(vec![FieldMeta::new(
            self.config.map_field.clone(),
            ValueMeta::map(
                element(&self.config.key_field),
                element(&self.config.value_field),
            ),
        )])
    }

    /// Validate the configuration against an input schema without running.
    pub fn check(&self, input: &RowSchema) -> Vec<CheckRemark> {
        let mut remarks = Vec::new();
        if input.is_empty() {
            remarks.push(CheckRemark::warning("No input fields received"));
        }
        if self.config.map_field.trim().is_empty() {
            remarks.push(CheckRemark::error("Map field name is empty"));
        }
        for (role, name) in [
            (FieldRole::Key, &self.config.key_field),
            (FieldRole::Value, &self.config.value_field),
        ] {
            if input.is_empty() {
                continue;
            }
            match input.index_of(name) {
                Some(_) => remarks.push(CheckRemark::ok(format!("Found {} field '{}'", role, name))),
                None => remarks.push(CheckRemark::error(format!(
                    "Couldn't find {} field '{}' in the input",
                    role, name
                ))),
            }
        }
        remarks
    }

    /// Pull every row from `source`, then emit the map row into `sink`.
    ///
    /// A stop request observed between rows ends the run without output.
    /// Any error ends the run with no output and is recorded in the outcome.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K, stop: &StopFlag) -> StepOutcome
    where
        S: RowSource + ?Sized,
        K: RowSink + ?Sized,
    {
        let mut outcome = StepOutcome::default();
        info!(step = STEP_NAME, map = %self.config.map_field, "starting");
        if let Err(e) = self.init() {
            return self.fail(sink, outcome, e);
        }
        loop {
            if stop.is_stopped() {
                warn!(step = STEP_NAME, lines_read = outcome.lines_read, "stop requested");
                self.state = FoldState::Done;
                outcome.stopped = true;
                return self.finish(sink, outcome);
            }
            match source.next_row() {
                Ok(Some(row)) => {
                    outcome.lines_read += 1;
                    if let Err(e) = self.accumulate(&row) {
                        return self.fail(sink, outcome, e);
                    }
                    report_progress(STEP_NAME, self.config.feedback_interval, outcome.lines_read);
                }
                Ok(None) => break,
                Err(e) => return self.fail(sink, outcome, e.into()),
            }
        }
        let emitted = self
            .flush()
            .and_then(|row| sink.emit(row).map_err(StepError::from));
        match emitted {
            Ok(()) => {
                outcome.lines_written += 1;
                self.finish(sink, outcome)
            }
            Err(e) => self.fail(sink, outcome, e),
        }
    }

    fn finish<K: RowSink + ?Sized>(&mut self, sink: &mut K, outcome: StepOutcome) -> StepOutcome {
        if let Err(e) = sink.finish() {
            return self.fail(sink, outcome, e.into());
        }
        info!(step = STEP_NAME, summary = %outcome, "finished");
        outcome
    }

    fn fail<K: RowSink + ?Sized>(
        &mut self,
        sink: &mut K,
        mut outcome: StepOutcome,
        err: StepError,
    ) -> StepOutcome {
        error!(step = STEP_NAME, error = %err, "failed");
        self.state = FoldState::Failed;
        outcome.errors += 1;
        outcome.failure = Some(err);
        // The run already failed; a second error from closing adds nothing.
        let _ = sink.finish();
        outcome
    }
}

/// Type (with normal storage) and native value of the field called `name`.
fn native_cell(row: &Row, role: FieldRole, name: &str) -> Result<(ValueMeta, Value), StepError> {
    let (field, value) = row
        .schema()
        .iter()
        .zip(row.values())
        .find(|(field, _)| field.name == name)
        .ok_or_else(|| StepError::field_not_found(role, name))?;
    let native = field.meta.to_native(value)?.into_owned();
    Ok((field.meta.as_normal(), native))
}
