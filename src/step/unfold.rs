//! Unfold: one output row per entry of a map cell.

use std::sync::Arc;

use super::error::{FieldRole, StepError};
use super::{CheckRemark, StepOutcome, StopFlag, report_progress};
use crate::logging::{debug, error, info, trace, warn};
use crate::row::{FieldMeta, Row, RowSchema, RowSink, RowSource};
use crate::value::{MapValueType, Value, ValueError, ValueMeta};

const STEP_NAME: &str = "unfold";

#[cfg(feature = "config")]
fn default_remove_map_field() -> bool {
    true
}

/// Fields read and written by an [`UnfoldOperator`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
pub struct UnfoldConfig {
    /// Input field holding the map.
    pub map_field: String,
    /// Output field receiving each entry's key.
    pub key_field: String,
    /// Output field receiving each entry's value.
    pub value_field: String,
    /// Drop the map field from output rows.
    #[cfg_attr(feature = "config", serde(default = "default_remove_map_field"))]
    pub remove_map_field: bool,
    #[cfg_attr(feature = "config", serde(default))]
    pub feedback_interval: Option<u64>,
}

impl UnfoldConfig {
    pub fn new(
        map_field: impl Into<String>,
        key_field: impl Into<String>,
        value_field: impl Into<String>,
    ) -> Self {
        Self {
            map_field: map_field.into(),
            key_field: key_field.into(),
            value_field: value_field.into(),
            remove_map_field: true,
            feedback_interval: None,
        }
    }

    pub fn keep_map_field(mut self) -> Self {
        self.remove_map_field = false;
        self
    }

    pub fn with_feedback_interval(mut self, interval: u64) -> Self {
        self.feedback_interval = Some(interval);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfoldState {
    Init,
    Running,
    Done,
    Failed,
}

/// Field positions and output schema, resolved from the first row.
#[derive(Debug)]
struct Resolved {
    input: Arc<RowSchema>,
    map_index: usize,
    map_type: MapValueType,
    output: Arc<RowSchema>,
}

/// Expands each input row into one row per entry of its map field.
///
/// Output rows carry the input's other fields unchanged, followed by the
/// entry's key and value. A null or empty map produces no rows. Rows are
/// emitted as soon as they are built.
#[derive(Debug)]
pub struct UnfoldOperator {
    config: UnfoldConfig,
    state: UnfoldState,
    resolved: Option<Resolved>,
}

impl UnfoldOperator {
    pub fn new(config: UnfoldConfig) -> Self {
        Self {
            config,
            state: UnfoldState::Init,
            resolved: None,
        }
    }

    pub fn config(&self) -> &UnfoldConfig {
        &self.config
    }

    pub fn state(&self) -> UnfoldState {
        self.state
    }

    /// Schema of the output rows, once resolved from the first input row.
    pub fn resolved_schema(&self) -> Option<&Arc<RowSchema>> {
        self.resolved.as_ref().map(|r| &r.output)
    }

    /// Output schema for an input schema: the map field (unless kept) is
    /// replaced by the key and value fields appended at the end, typed after
    /// the map's element types.
    pub fn output_schema(&self, input: &RowSchema) -> Result<RowSchema, StepError> {
        let (index, map_type) = self.map_field(input)?;
        let mut output = input.clone();
        if self.config.remove_map_field {
            output.remove_at(index);
        }
        output.append(FieldMeta::new(
            self.config.key_field.clone(),
            map_type.key_meta().as_normal(),
        ));
        output.append(FieldMeta::new(
            self.config.value_field.clone(),
            map_type.value_meta().as_normal(),
        ));
        Ok(output)
    }

    fn map_field<'s>(&self, input: &'s RowSchema) -> Result<(usize, &'s MapValueType), StepError> {
        let name = &self.config.map_field;
        let index = input
            .index_of(name)
            .ok_or_else(|| StepError::field_not_found(FieldRole::Map, name))?;
        let field = input
            .field(index)
            .ok_or_else(|| StepError::field_not_found(FieldRole::Map, name))?;
        let map_type = field.meta.as_map().ok_or_else(|| StepError::NotAMap {
            name: name.clone(),
            actual: field.meta.to_string(),
        })?;
        Ok((index, map_type))
    }

    /// Validate the configuration against an input schema without running.
    pub fn check(&self, input: &RowSchema) -> Vec<CheckRemark> {
        let mut remarks = Vec::new();
        if input.is_empty() {
            remarks.push(CheckRemark::warning("No input fields received"));
            return remarks;
        }
        match self.map_field(input) {
            Ok((_, map_type)) => remarks.push(CheckRemark::ok(format!(
                "Map field '{}' is {}",
                self.config.map_field,
                ValueMeta::Map(map_type.clone())
            ))),
            Err(e) => remarks.push(CheckRemark::error(e.to_string())),
        }
        for (role, name) in [
            (FieldRole::Key, &self.config.key_field),
            (FieldRole::Value, &self.config.value_field),
        ] {
            if name.trim().is_empty() {
                remarks.push(CheckRemark::error(format!("{} field name is empty", role)));
            } else if input.index_of(name).is_some() {
                remarks.push(CheckRemark::warning(format!(
                    "Output {} field '{}' shadows an input field",
                    role, name
                )));
            }
        }
        remarks
    }

    /// Validate the configured names.
    pub fn init(&mut self) -> Result<(), StepError> {
        match self.state {
            UnfoldState::Init => {}
            UnfoldState::Running => return Ok(()),
            _ => return Err(StepError::AlreadyFinished),
        }
        for (what, name) in [
            ("map", &self.config.map_field),
            ("key", &self.config.key_field),
            ("value", &self.config.value_field),
        ] {
            if name.trim().is_empty() {
                self.state = UnfoldState::Failed;
                return Err(StepError::Config(format!("{} field name is empty", what)));
            }
        }
        self.state = UnfoldState::Running;
        Ok(())
    }

    fn resolve(&mut self, schema: &Arc<RowSchema>) -> Result<&Resolved, StepError> {
        let stale = match &self.resolved {
            Some(r) => !Arc::ptr_eq(&r.input, schema) && r.input.as_ref() != schema.as_ref(),
            None => true,
        };
        if stale {
            let (map_index, map_type) = self.map_field(schema)?;
            let map_type = map_type.clone();
            let output = Arc::new(self.output_schema(schema)?);
            debug!(
                map_index,
                output = %output,
                "unfold resolved output schema"
            );
            self.resolved = Some(Resolved {
                input: Arc::clone(schema),
                map_index,
                map_type,
                output,
            });
        }
        self.resolved
            .as_ref()
            .ok_or_else(|| StepError::field_not_found(FieldRole::Map, &self.config.map_field))
    }

    /// Expand one row, emitting each output row into `sink` immediately.
    /// Returns the number of rows emitted.
    pub fn process<K: RowSink + ?Sized>(&mut self, row: &Row, sink: &mut K) -> Result<u64, StepError> {
        self.init()?;
        self.process_row(row, sink)
            .inspect_err(|_| self.state = UnfoldState::Failed)
    }

    fn process_row<K: RowSink + ?Sized>(&mut self, row: &Row, sink: &mut K) -> Result<u64, StepError> {
        let remove = self.config.remove_map_field;
        let resolved = self.resolve(row.schema())?;
        let cell = row.get(resolved.map_index).unwrap_or(&Value::Null);
        let Some(map) = resolved.map_type.get_map(cell)? else {
            trace!("null map, nothing to emit");
            return Ok(0);
        };

        let base: Vec<Value> = row
            .values()
            .iter()
            .enumerate()
            .filter(|(i, _)| !(remove && *i == resolved.map_index))
            .map(|(_, v)| v.clone())
            .collect();
        let key_meta = resolved.map_type.key_meta();
        let value_meta = resolved.map_type.value_meta();

        let mut emitted = 0;
        for (key, value) in map.iter() {
            let mut values = Vec::with_capacity(base.len() + 2);
            values.extend(base.iter().cloned());
            values.push(conform(key_meta, key)?);
            values.push(conform(value_meta, value)?);
            sink.emit(Row::new(Arc::clone(&resolved.output), values)?)?;
            emitted += 1;
        }
        trace!(entries = emitted, "unfolded row");
        Ok(emitted)
    }

    /// Pull rows from `source` until it is exhausted, unfolding each into
    /// `sink`. Errors end the run and are recorded in the outcome.
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
                outcome.stopped = true;
                break;
            }
            match source.next_row() {
                Ok(Some(row)) => {
                    outcome.lines_read += 1;
                    match self.process(&row, sink) {
                        Ok(n) => outcome.lines_written += n,
                        Err(e) => return self.fail(sink, outcome, e),
                    }
                    report_progress(STEP_NAME, self.config.feedback_interval, outcome.lines_read);
                }
                Ok(None) => break,
                Err(e) => return self.fail(sink, outcome, e.into()),
            }
        }
        self.state = UnfoldState::Done;
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
        self.state = UnfoldState::Failed;
        outcome.errors += 1;
        outcome.failure = Some(err);
        // The run already failed; a second error from closing adds nothing.
        let _ = sink.finish();
        outcome
    }
}

/// Bring an entry into the form its element type declares: stored forms are
/// resolved, and text parsed from a textual map cell is converted to typed
/// values.
fn conform(meta: &ValueMeta, value: &Value) -> Result<Value, ValueError> {
    let native = meta.to_native(value)?;
    match native.as_ref() {
        Value::String(text) if !meta.is_textual() => meta.parse_text(text),
        _ => Ok(native.into_owned()),
    }
}
