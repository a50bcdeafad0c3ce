use std::{
    cell::Cell,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use crate::exec::Loop;

/// Time source for a [`Loop`] and the timers it drives.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block the loop thread until `deadline`. Only called when no task is ready to run.
    fn sleep_until(&self, deadline: Instant);
}

/// Wall clock time, sleeping the thread while waiting for timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}

/// Virtual time. Waiting for a timer jumps straight to its deadline, so timed tests run
/// instantly and deterministically. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Rc<ManualInner>,
}

#[derive(Debug)]
struct ManualInner {
    base: Instant,
    offset: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ManualInner {
                base: Instant::now(),
                offset: Cell::new(Duration::ZERO),
            }),
        }
    }

    /// Virtual time passed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.offset.get()
    }

    pub fn advance(&self, by: Duration) {
        self.inner.offset.set(self.inner.offset.get() + by);
    }

    /// Move time forward to `when`. Does nothing if `when` is in the past.
    pub fn advance_to(&self, when: Instant) {
        let target = when.saturating_duration_since(self.inner.base);
        if target > self.inner.offset.get() {
            self.inner.offset.set(target);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner.base + self.inner.offset.get()
    }

    fn sleep_until(&self, deadline: Instant) {
        self.advance_to(deadline);
    }
}

/// The running loop's notion of now, or wall time outside of a loop.
pub(crate) fn now() -> Instant {
    Loop::try_with_current(|lp| lp.now()).unwrap_or_else(Instant::now)
}
