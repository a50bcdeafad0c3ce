use std::{any::Any, fmt};

use thiserror::Error;

/// Errors returned when reading the result of a [`Task`][crate::Task].
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task has not completed")]
    Pending,
    #[error("task result was already taken")]
    Taken,
    #[error("task panicked: {0}")]
    Panicked(Failure),
}

impl TaskError {
    /// Returns the captured failure, if this error carries one.
    pub fn into_failure(self) -> Option<Failure> {
        match self {
            TaskError::Panicked(f) => Some(f),
            _ => None,
        }
    }
}

/// A failure captured while polling a task. Holds whatever payload the task panicked with.
pub struct Failure {
    payload: Box<dyn Any + Send + 'static>,
}

impl Failure {
    pub(crate) fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self { payload }
    }

    /// The panic message, if the payload was a string.
    pub fn message(&self) -> Option<&str> {
        if let Some(s) = self.payload.downcast_ref::<&'static str>() {
            Some(s)
        } else {
            self.payload.downcast_ref::<String>().map(|s| s.as_str())
        }
    }

    /// Borrow the raw payload.
    pub fn payload(&self) -> &(dyn Any + Send + 'static) {
        &*self.payload
    }

    /// Re-raise this failure on the current thread.
    pub fn resume(self) -> ! {
        std::panic::resume_unwind(self.payload)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure")
            .field(&self.message().unwrap_or("<opaque payload>"))
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().unwrap_or("<opaque payload>"))
    }
}
