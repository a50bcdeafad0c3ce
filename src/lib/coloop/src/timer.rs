use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
    time::{Duration, Instant},
};

use crate::{
    clock,
    exec::{Loop, TimerKey, TimerQueue},
    task::Task,
};

/// A future that completes once a deadline has passed.
///
/// A deadline that is already due completes on the first poll without suspending. Otherwise the
/// timer registers with the running loop, which wakes it from its timer set.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Timer {
    when: Instant,
    registration: Option<(Weak<RefCell<TimerQueue>>, TimerKey)>,
}

impl Timer {
    /// Timer for `dur` from now, as seen by the running loop's clock.
    pub fn after(dur: Duration) -> Timer {
        Timer::at(clock::now() + dur)
    }

    pub fn at(when: Instant) -> Timer {
        Timer {
            when,
            registration: None,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.when
    }

    fn deregister(&mut self) {
        if let Some((queue, key)) = self.registration.take() {
            if let Some(queue) = queue.upgrade() {
                queue.borrow_mut().remove(key);
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl Future for Timer {
    type Output = Instant;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if clock::now() >= self.when {
            self.deregister();
            return Poll::Ready(self.when);
        }

        let refreshed = match &self.registration {
            Some((queue, key)) => queue
                .upgrade()
                .is_some_and(|queue| queue.borrow_mut().update(*key, cx.waker())),
            None => false,
        };
        if !refreshed {
            let when = self.when;
            self.registration = Some(Loop::with_current(|lp| {
                (
                    Rc::downgrade(lp.timer_queue()),
                    lp.add_timer(when, cx.waker().clone()),
                )
            }));
        }
        Poll::Pending
    }
}

/// A task that completes once `when` has passed.
pub fn sleep_until(when: Instant) -> Task<()> {
    Task::new(async move {
        Timer::at(when).await;
    })
}

/// A task that completes `dur` after it first runs. `sleep_for(Duration::ZERO)` never suspends.
pub fn sleep_for(dur: Duration) -> Task<()> {
    Task::new(async move {
        Timer::after(dur).await;
    })
}

#[cfg(test)]
mod tests {
    use futures_util::task::noop_waker;

    use super::*;
    use crate::{
        clock::{Clock, ManualClock},
        State,
    };

    #[test]
    fn zero_sleep_does_not_suspend() {
        let mut task = sleep_for(Duration::ZERO);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        // no loop is running, so a suspension would have panicked
        assert!(task.drive(&mut cx).is_ready());
        assert_eq!(task.state(), State::Completed);
    }

    #[test]
    fn past_deadline_is_ready() {
        let lp = Loop::new();
        let past = lp.now();
        lp.block_on(sleep_until(past)).unwrap();
        assert_eq!(lp.pending_timers(), 0);
    }

    #[test]
    #[should_panic(expected = "not inside a running event loop")]
    fn pending_timer_needs_a_loop() {
        let mut timer = Timer::after(Duration::from_secs(60));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let _ = Pin::new(&mut timer).poll(&mut cx);
    }

    #[test]
    fn dropped_timer_leaves_the_set() {
        let clock = ManualClock::new();
        let lp = Loop::builder().clock(clock.clone()).build();
        let handle = lp.spawn(Task::new(async {
            let mut timer = Timer::after(Duration::from_secs(10));
            let registered = std::future::poll_fn(|cx| {
                assert!(Pin::new(&mut timer).poll(cx).is_pending());
                Poll::Ready(Loop::with_current(|lp| lp.pending_timers()))
            })
            .await;
            drop(timer);
            (registered, Loop::with_current(|lp| lp.pending_timers()))
        }));
        lp.run();
        assert_eq!(handle.result().unwrap(), (1, 0));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn sleep_for_uses_loop_clock() {
        let clock = ManualClock::new();
        let lp = Loop::builder().clock(clock.clone()).build();
        let woke = lp
            .block_on(Task::new(async {
                Timer::after(Duration::from_millis(1500)).await
            }))
            .unwrap();
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
        assert_eq!(woke, clock.now());
    }
}
