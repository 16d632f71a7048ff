//! Logging for the codec, row stream and operators.
//!
//! rowmap never installs a subscriber. With the `logging` feature each macro
//! below hands its arguments to the `tracing` macro of the same level;
//! without it the call disappears at compile time, arguments included, so
//! the per-cell `trace!` calls in the codec cost nothing in default builds.
//!
//! ```rust,ignore
//! use crate::logging::{debug, trace};
//!
//! debug!(output = %schema, "unfold resolved output schema");
//! trace!(entries = count, "decoded map cell");
//! ```

/// An operator run ended with a failure (recorded in its `StepOutcome`).
#[cfg(feature = "logging")]
macro_rules! rowmap_error {
    ($($arg:tt)*) => { tracing::error!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! rowmap_error {
    ($($arg:tt)*) => {};
}

/// An operator noticed a stop request between rows.
#[cfg(feature = "logging")]
macro_rules! rowmap_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! rowmap_warn {
    ($($arg:tt)*) => {};
}

/// Operator start, finish summary and `feedback_interval` progress.
#[cfg(feature = "logging")]
macro_rules! rowmap_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! rowmap_info {
    ($($arg:tt)*) => {};
}

/// Row stream headers read, output schemas resolved, fold configuration.
#[cfg(feature = "logging")]
macro_rules! rowmap_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! rowmap_debug {
    ($($arg:tt)*) => {};
}

/// One event per decoded map cell, folded entry or unfolded row.
#[cfg(feature = "logging")]
macro_rules! rowmap_trace {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) }
}

#[cfg(not(feature = "logging"))]
macro_rules! rowmap_trace {
    ($($arg:tt)*) => {};
}

pub(crate) use rowmap_debug as debug;
pub(crate) use rowmap_error as error;
pub(crate) use rowmap_info as info;
pub(crate) use rowmap_trace as trace;
pub(crate) use rowmap_warn as warn;
