//! Shared plumbing for [`when_all`][crate::when_all] and [`when_any`][crate::when_any].
//!
//! Each child of a combinator is wrapped in a relay task that runs on the loop by itself. When the
//! child produces a value the relay forwards it into the combinator's storage and reports to a
//! completion block. The block holds the waker of the waiting combinator and decides which relay,
//! if any, wakes it.

use std::{
    cell::{Cell, RefCell},
    future::{poll_fn, Future},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use crate::{exec::Loop, task::Task};

/// Completion state shared by the relays of one combinator call.
pub(crate) trait Completion {
    fn waiter(&self) -> &RefCell<Option<Waker>>;

    fn is_done(&self) -> bool;

    fn register(&self, waker: &Waker) {
        let mut waiter = self.waiter().borrow_mut();
        match &*waiter {
            Some(w) if w.will_wake(waker) => {}
            _ => *waiter = Some(waker.clone()),
        }
    }

    fn notify(&self) {
        let waiter = self.waiter().borrow_mut().take();
        if let Some(w) = waiter {
            w.wake();
        }
    }
}

/// Block for `when_all`: counts children that have not reported yet.
pub(crate) struct AllBlock {
    remaining: Cell<usize>,
    waiter: RefCell<Option<Waker>>,
}

impl AllBlock {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Cell::new(count),
            waiter: RefCell::new(None),
        }
    }

    /// One child reported. The child that brings the count to zero wakes the combinator.
    pub fn arrive(&self) {
        let remaining = self.remaining.get() - 1;
        self.remaining.set(remaining);
        if remaining == 0 {
            self.notify();
        }
    }
}

impl Completion for AllBlock {
    fn waiter(&self) -> &RefCell<Option<Waker>> {
        &self.waiter
    }

    fn is_done(&self) -> bool {
        self.remaining.get() == 0
    }
}

/// Block for `when_any`: remembers which child finished first.
pub(crate) struct AnyBlock {
    winner: Cell<Option<usize>>,
    waiter: RefCell<Option<Waker>>,
}

impl AnyBlock {
    pub fn new() -> Self {
        Self {
            winner: Cell::new(None),
            waiter: RefCell::new(None),
        }
    }

    pub fn winner(&self) -> Option<usize> {
        self.winner.get()
    }

    /// Record `index` as the winner and wake the combinator. Only the first call has any effect.
    pub fn win(&self, index: usize) -> bool {
        if self.winner.get().is_some() {
            return false;
        }
        self.winner.set(Some(index));
        self.notify();
        true
    }
}

impl Completion for AnyBlock {
    fn waiter(&self) -> &RefCell<Option<Waker>> {
        &self.waiter
    }

    fn is_done(&self) -> bool {
        self.winner.get().is_some()
    }
}

/// Wrap `child` in a relay task. The relay drives the child to completion and passes its value to
/// `forward`. A child that failed keeps its failure in its own result cell and nothing is
/// forwarded, so the combinator never hears from it.
pub(crate) fn relay<T: 'static>(
    mut child: Task<T>,
    index: usize,
    forward: impl FnOnce(T) + 'static,
) -> Task<()> {
    Task::new(async move {
        poll_fn(|cx| child.drive(cx)).await;
        if child.is_failed() {
            tracing::debug!(index, "combinator child failed, not forwarding");
            return;
        }
        match child.result() {
            Ok(value) => forward(value),
            Err(e) => tracing::debug!(index, "combinator child has no result: {}", e),
        }
    })
}

/// Waits on a completion block after starting the relays that report to it.
///
/// The first poll records the waiting task's waker in the block, pushes relays `1..` onto the
/// ready queue and runs relay `0` inline.
pub(crate) struct Gather<B> {
    block: Rc<B>,
    relays: Option<Vec<Task<()>>>,
}

impl<B: Completion> Gather<B> {
    pub fn new(block: Rc<B>, relays: Vec<Task<()>>) -> Self {
        Self {
            block,
            relays: Some(relays),
        }
    }
}

impl<B: Completion> Future for Gather<B> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.block.register(cx.waker());
        if let Some(relays) = self.relays.take() {
            Loop::with_current(|lp| {
                let mut relays = relays.into_iter();
                let first = relays.next();
                for relay in relays {
                    lp.spawn(relay);
                }
                if let Some(first) = first {
                    lp.spawn_inline(first);
                }
            });
        }

        if self.block.is_done() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
