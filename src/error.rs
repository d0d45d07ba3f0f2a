//! Error types shared by the scheduler, the runner and the unit
//! implementations, built on `thiserror`.

use thiserror::Error;

/// Everything that can stop a run from starting or finishing.
///
/// Worker failures are deliberately absent: a worker that panics or exits
/// with a non-zero status is recorded in the [`RunReport`] and never turns a
/// run into an error.
///
/// [`RunReport`]: crate::runner::RunReport
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid worker count or other invalid configuration, detected before
    /// anything is spawned.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The scheduler produced more chunks than there are workers.
    #[error("Too many tasks are assigned to workers: {chunks} chunks for {workers} workers")]
    TooManyTasks { chunks: usize, workers: usize },

    /// The isolation primitive for a unit could not be created.
    #[error("Failed to spawn unit {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on a unit failed at the OS level.
    #[error("Failed to join unit {index}: {message}")]
    Join { index: usize, message: String },

    /// The run was interrupted through its cancellation probe.
    #[error("Run was cancelled")]
    Cancelled,
}

/// Type alias for results using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a join error for the unit at `index`.
    pub fn join(index: usize, message: impl Into<String>) -> Self {
        Self::Join {
            index,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_counts() {
        let err = Error::TooManyTasks {
            chunks: 5,
            workers: 4,
        };
        assert_eq!(
            err.to_string(),
            "Too many tasks are assigned to workers: 5 chunks for 4 workers"
        );
        assert_eq!(
            Error::config("worker count must be positive").to_string(),
            "Configuration error: worker count must be positive"
        );
    }
}
