use std::{
    cell::RefCell,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    rc::Rc,
    task::{ready, Context, Poll},
};

use futures_util::{future::LocalBoxFuture, FutureExt};

use crate::{
    cell::ResultCell,
    error::{Failure, TaskError},
    exec::Loop,
};

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built but never polled.
    Created,
    /// Currently inside a poll.
    Running,
    /// The last poll returned `Pending`; some waker (a timer, a combinator, or an awaiting task)
    /// will resume it.
    Suspended,
    /// The result cell holds a value or a captured failure.
    Completed,
}

/// A deferred computation with a declared output type.
///
/// Tasks are lazy: nothing runs until the task is awaited by another task or handed to a
/// [`Loop`]. Awaiting a task drives it inline, so the awaiter is resumed as soon as it finishes.
///
/// A panic inside the computation does not unwind out of the loop. It is captured into the task's
/// result and re-raised only when the result is read: awaiting a failed task re-raises the failure
/// in the awaiter, and [`Task::result`] returns it as [`TaskError::Panicked`].
#[must_use = "tasks do nothing unless you `.await` them or hand them to a loop"]
pub struct Task<T> {
    future: Option<LocalBoxFuture<'static, T>>,
    cell: Rc<RefCell<ResultCell<T>>>,
    state: State,
}

impl<T: 'static> Task<T> {
    pub fn new(future: impl Future<Output = T> + 'static) -> Task<T> {
        Task {
            future: Some(future.boxed_local()),
            cell: Rc::new(RefCell::new(ResultCell::new())),
            state: State::Created,
        }
    }

    /// Schedule this task onto the loop that is currently running and let it run in the
    /// background. The returned handle reads its result later.
    ///
    /// Panics if called outside of [`Loop::run`].
    pub fn detach(self) -> TaskHandle<T> {
        Loop::with_current(|lp| lp.spawn(self))
    }
}

impl<T> Task<T> {
    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Completed
    }

    /// True if the task completed with a failure that has not been read yet.
    pub fn is_failed(&self) -> bool {
        self.cell.borrow().is_failed()
    }

    /// A handle onto this task's result that outlives handing the task itself away.
    pub fn handle(&self) -> TaskHandle<T> {
        TaskHandle {
            cell: self.cell.clone(),
        }
    }

    /// Take the task's result. Succeeds at most once, and only after the task completed.
    pub fn result(&self) -> Result<T, TaskError> {
        self.cell.borrow_mut().take()
    }

    /// Poll the wrapped computation one step. Returns `Ready` once the result cell is populated;
    /// the result itself stays in the cell.
    pub(crate) fn drive(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(future) = self.future.as_mut() else {
            return Poll::Ready(());
        };

        self.state = State::Running;
        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx))) {
            Ok(Poll::Pending) => {
                self.state = State::Suspended;
                return Poll::Pending;
            }
            Ok(Poll::Ready(value)) => self.cell.borrow_mut().put_value(value),
            Err(payload) => {
                let failure = Failure::new(payload);
                tracing::debug!("task failed: {}", failure);
                self.cell.borrow_mut().put_failure(failure);
            }
        }
        self.future = None;
        self.state = State::Completed;
        Poll::Ready(())
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        ready!(self.drive(cx));
        let result = self.cell.borrow_mut().take();
        match result {
            Ok(value) => Poll::Ready(value),
            Err(TaskError::Panicked(failure)) => failure.resume(),
            Err(e) => panic!("awaited a task with no result: {}", e),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("state", &self.state).finish()
    }
}

/// Shared view of a task's result cell.
pub struct TaskHandle<T> {
    cell: Rc<RefCell<ResultCell<T>>>,
}

impl<T> TaskHandle<T> {
    pub fn is_complete(&self) -> bool {
        self.cell.borrow().is_filled()
    }

    /// True if the task completed with a failure that has not been read yet.
    pub fn is_failed(&self) -> bool {
        self.cell.borrow().is_failed()
    }

    /// Take the task's result. Succeeds at most once, and only after the task completed.
    pub fn result(&self) -> Result<T, TaskError> {
        self.cell.borrow_mut().take()
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("complete", &self.is_complete())
            .finish()
    }
}
