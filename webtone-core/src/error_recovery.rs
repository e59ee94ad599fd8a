//! Error recovery strategies for the filtering pipeline.
//!
//! No error is fatal to the engine as a whole: external-call failures skip the
//! current step, malformed persisted data falls back to defaults, and only
//! configuration problems at startup are allowed to fail.

use crate::{CoreError, ErrorExt, StorageError};
use tracing::{debug, warn};

/// Recovery strategy for handling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Drop the current step; the post stays eligible for the next scan
    Skip,
    /// Substitute a default value and continue
    Fallback,
    /// Propagate the error
    Fail,
}

/// Result of an error recovery attempt
#[derive(Debug)]
pub enum RecoveryResult<T> {
    /// The operation succeeded
    Recovered(T),
    /// The operation failed and a fallback value was substituted
    Degraded(T),
    /// The operation failed and should be skipped
    Skipped,
    /// The error should be propagated
    Failed(CoreError),
}

impl<T> RecoveryResult<T> {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryResult::Recovered(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RecoveryResult::Degraded(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RecoveryResult::Skipped)
    }

    /// Returns the value if recovered or degraded
    pub fn ok(self) -> Option<T> {
        match self {
            RecoveryResult::Recovered(value) | RecoveryResult::Degraded(value) => Some(value),
            _ => None,
        }
    }

    pub fn unwrap_or_else(self, fallback: impl FnOnce() -> T) -> T {
        self.ok().unwrap_or_else(fallback)
    }

    /// Returns the error if failed, None otherwise
    pub fn err(self) -> Option<CoreError> {
        match self {
            RecoveryResult::Failed(error) => Some(error),
            _ => None,
        }
    }
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            CoreError::Classifier(_) | CoreError::Network(_) | CoreError::Io(_) => {
                RecoveryStrategy::Skip
            }

            CoreError::Storage(StorageError::Encoding { .. }) => RecoveryStrategy::Fallback,
            CoreError::Storage(StorageError::MigrationFailed { .. }) => RecoveryStrategy::Fail,
            CoreError::Storage(_) => RecoveryStrategy::Skip,

            CoreError::Serialization(_) => RecoveryStrategy::Fallback,

            // Needs user intervention
            CoreError::Config(_) => RecoveryStrategy::Fail,

            CoreError::InvalidInput { .. } => RecoveryStrategy::Skip,
            CoreError::Internal { .. } => RecoveryStrategy::Fail,
        }
    }

    /// Applies the strategy for `result`'s error, logging what was done.
    /// `fallback` is only consulted for [`RecoveryStrategy::Fallback`].
    pub fn recover<T>(
        result: Result<T, CoreError>,
        operation: &str,
        fallback: impl FnOnce() -> T,
    ) -> RecoveryResult<T> {
        let error = match result {
            Ok(value) => return RecoveryResult::Recovered(value),
            Err(error) => error,
        };

        match Self::determine_strategy(&error) {
            RecoveryStrategy::Skip => {
                debug!(
                    "Skipping {} after {} failure: {}",
                    operation,
                    error.error_code(),
                    error
                );
                RecoveryResult::Skipped
            }
            RecoveryStrategy::Fallback => {
                warn!("Using fallback for {}: {}", operation, error);
                RecoveryResult::Degraded(fallback())
            }
            RecoveryStrategy::Fail => {
                error.log_error();
                RecoveryResult::Failed(error)
            }
        }
    }
}
