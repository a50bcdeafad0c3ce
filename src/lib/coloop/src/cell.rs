use std::mem;

use crate::error::{Failure, TaskError};

enum Slot<T> {
    Empty,
    Value(T),
    Failed(Failure),
    Taken,
}

/// Write-once, read-once storage for the outcome of a task.
pub(crate) struct ResultCell<T> {
    slot: Slot<T>,
}

impl<T> ResultCell<T> {
    pub fn new() -> Self {
        Self { slot: Slot::Empty }
    }

    pub fn put_value(&mut self, value: T) {
        self.put(Slot::Value(value));
    }

    pub fn put_failure(&mut self, failure: Failure) {
        self.put(Slot::Failed(failure));
    }

    fn put(&mut self, slot: Slot<T>) {
        assert!(
            matches!(self.slot, Slot::Empty),
            "result cell written more than once"
        );
        self.slot = slot;
    }

    /// True once a value or failure has been written, even if it was since taken.
    pub fn is_filled(&self) -> bool {
        !matches!(self.slot, Slot::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.slot, Slot::Failed(_))
    }

    pub fn take(&mut self) -> Result<T, TaskError> {
        match mem::replace(&mut self.slot, Slot::Taken) {
            Slot::Value(v) => Ok(v),
            Slot::Failed(f) => Err(TaskError::Panicked(f)),
            Slot::Taken => Err(TaskError::Taken),
            Slot::Empty => {
                self.slot = Slot::Empty;
                Err(TaskError::Pending)
            }
        }
    }
}
