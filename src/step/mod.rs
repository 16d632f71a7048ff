//! Row operators.
//!
//! # Module Organization
//!
//! - [`error`]: Errors that end an operator run
//! - [`fold`]: [`FoldOperator`], many rows into one map
//! - [`unfold`]: [`UnfoldOperator`], one row per map entry
//!
//! Each operator instance owns all of its state. Running several copies in
//! parallel over partitioned input needs no coordination: every copy pulls
//! from its own [`RowSource`](crate::row::RowSource) and reports its own
//! [`StepOutcome`].

pub mod error;
pub mod fold;
pub mod unfold;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use error::{FieldRole, StepError};
pub use fold::{FoldConfig, FoldOperator, FoldState};
pub use unfold::{UnfoldConfig, UnfoldOperator, UnfoldState};

use crate::logging::info;

/// Cooperative stop request shared between a pipeline and its operators.
///
/// Operators check the flag before pulling each row.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of running an operator to completion.
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub lines_read: u64,
    pub lines_written: u64,
    pub errors: u64,
    /// A stop request ended the run early.
    pub stopped: bool,
    /// The error that ended the run, if any.
    pub failure: Option<StepError>,
}

impl StepOutcome {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed: {} read, {} written, {} errors{}",
            self.lines_read,
            self.lines_written,
            self.errors,
            if self.stopped { " (stopped)" } else { "" }
        )
    }

    /// Turn a failed outcome into its error.
    pub fn into_result(mut self) -> Result<Self, StepError> {
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RemarkLevel {
    Ok,
    Warning,
    Error,
}

/// Design-time validation finding for an operator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRemark {
    pub level: RemarkLevel,
    pub message: String,
}

impl CheckRemark {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            level: RemarkLevel::Ok,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: RemarkLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: RemarkLevel::Error,
            message: message.into(),
        }
    }
}

/// True if any remark is an error.
pub fn has_check_errors(remarks: &[CheckRemark]) -> bool {
    remarks.iter().any(|r| r.level == RemarkLevel::Error)
}

/// Log progress every `interval` rows read.
#[cfg_attr(not(feature = "logging"), allow(unused_variables))]
pub(crate) fn report_progress(step: &str, interval: Option<u64>, lines_read: u64) {
    if let Some(every) = interval
        && every > 0
        && lines_read % every == 0
    {
        info!(step, lines_read, "progress");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_shared_between_clones() {
        let flag = StopFlag::new();
        let copy = flag.clone();
        assert!(!copy.is_stopped());
        flag.request_stop();
        assert!(copy.is_stopped());
    }

    #[test]
    fn test_outcome_into_result() {
        let ok = StepOutcome {
            lines_read: 2,
            lines_written: 1,
            ..Default::default()
        };
        assert_eq!(ok.summary(), "Processed: 2 read, 1 written, 0 errors");
        assert!(ok.into_result().is_ok());

        let failed = StepOutcome {
            errors: 1,
            failure: Some(StepError::Config("bad".into())),
            ..Default::default()
        };
        assert!(failed.has_errors());
        assert!(matches!(failed.into_result(), Err(StepError::Config(_))));
    }

    #[test]
    fn test_report_progress_accepts_any_interval() {
        for interval in [None, Some(0), Some(1), Some(3)] {
            for lines_read in 0..5 {
                report_progress("fold", interval, lines_read);
            }
        }
    }

    #[test]
    fn test_remark_levels() {
        let remarks = vec![CheckRemark::ok("fine"), CheckRemark::warning("hmm")];
        assert!(!has_check_errors(&remarks));
        assert!(has_check_errors(&[CheckRemark::error("broken")]));
    }
}
