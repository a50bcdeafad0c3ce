use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    fmt,
    future::poll_fn,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll, Waker},
    time::Instant,
};

use futures_util::{future::LocalBoxFuture, task::ArcWake, FutureExt};
use parking_lot::Mutex;
use scoped_tls_hkt::scoped_thread_local;
use stable_vec::StableVec;

use crate::{
    clock::{Clock, SystemClock},
    error::TaskError,
    task::{Task, TaskHandle},
};

scoped_thread_local! {
    static CURRENT: Loop
}

/// Ids of tasks that are ready to be polled, most recently scheduled first.
struct ReadyQueue {
    queue: Mutex<VecDeque<usize>>,
}

impl ReadyQueue {
    fn push(&self, id: usize) {
        self.queue.lock().push_front(id);
    }

    fn pop(&self) -> Option<usize> {
        self.queue.lock().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

struct TaskWaker {
    id: usize,
    queued: AtomicBool,
    ready: Arc<ReadyQueue>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if !arc_self.queued.swap(true, Ordering::AcqRel) {
            arc_self.ready.push(arc_self.id);
        }
    }
}

struct Slot {
    // None while the task is being polled.
    future: Option<LocalBoxFuture<'static, ()>>,
    waker: Arc<TaskWaker>,
}

/// Position of an entry in the timer set. Orders by deadline, then by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerKey {
    when: Instant,
    seq: u64,
}

impl TimerKey {
    pub fn deadline(&self) -> Instant {
        self.when
    }
}

#[derive(Default)]
pub(crate) struct TimerQueue {
    entries: BTreeMap<TimerKey, Waker>,
    next_seq: u64,
}

impl TimerQueue {
    fn insert(&mut self, when: Instant, waker: Waker) -> TimerKey {
        let key = TimerKey {
            when,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, waker);
        key
    }

    /// Replace the waker of a still-pending entry. Returns false if the entry is gone.
    pub(crate) fn update(&mut self, key: TimerKey, waker: &Waker) -> bool {
        match self.entries.get_mut(&key) {
            Some(w) => {
                if !w.will_wake(waker) {
                    *w = waker.clone();
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, key: TimerKey) -> Option<Waker> {
        self.entries.remove(&key)
    }

    fn first(&self) -> Option<TimerKey> {
        self.entries.keys().next().copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

/// Configuration for a [`Loop`].
pub struct Builder {
    name: String,
    clock: Box<dyn Clock>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            name: "coloop".to_owned(),
            clock: Box::new(SystemClock),
        }
    }

    /// Label for the loop's tracing span.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Time source for the loop and its timers. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn build(self) -> Loop {
        Loop {
            name: self.name,
            clock: self.clock,
            tasks: RefCell::new(StableVec::new()),
            ready: Arc::new(ReadyQueue {
                queue: Mutex::new(VecDeque::new()),
            }),
            timers: Rc::new(RefCell::new(TimerQueue::default())),
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// A single-threaded event loop with a ready queue and a timer set.
///
/// The loop is driven by calling [`Loop::run`], which polls ready tasks and fires timers until
/// there is nothing left to do. While `run` is active, tasks on this thread can reach the loop to
/// register timers and spawn more tasks.
///
/// ```
/// use std::time::Duration;
/// use coloop::{sleep_for, Loop, Task};
///
/// let lp = Loop::new();
/// let handle = lp.spawn(Task::new(async {
///     sleep_for(Duration::from_millis(1)).await;
///     7
/// }));
/// lp.run();
/// assert_eq!(handle.result().unwrap(), 7);
/// ```
pub struct Loop {
    name: String,
    clock: Box<dyn Clock>,
    tasks: RefCell<StableVec<Slot>>,
    ready: Arc<ReadyQueue>,
    timers: Rc<RefCell<TimerQueue>>,
}

impl Loop {
    pub fn new() -> Loop {
        Builder::new().build()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Run `f` against the loop that is running on this thread.
    ///
    /// Panics if no loop is running.
    pub(crate) fn with_current<R>(f: impl FnOnce(&Loop) -> R) -> R {
        if !CURRENT.is_set() {
            panic!("not inside a running event loop");
        }
        CURRENT.with(f)
    }

    pub(crate) fn try_with_current<R>(f: impl FnOnce(&Loop) -> R) -> Option<R> {
        if CURRENT.is_set() {
            Some(CURRENT.with(f))
        } else {
            None
        }
    }

    /// Place a task at the front of the ready queue. The returned handle reads its result once
    /// the task completes.
    pub fn spawn<T: 'static>(&self, task: Task<T>) -> TaskHandle<T> {
        let handle = task.handle();
        let id = self.insert(task);
        tracing::trace!(id, "spawn");
        self.schedule(id);
        handle
    }

    /// Add a task to the loop and poll it right away, within the current call.
    pub(crate) fn spawn_inline<T: 'static>(&self, task: Task<T>) -> TaskHandle<T> {
        let handle = task.handle();
        let id = self.insert(task);
        tracing::trace!(id, "spawn inline");
        self.run_task(id);
        handle
    }

    /// Spawn `task`, run the loop until it is quiescent, then read the task's result.
    pub fn block_on<T: 'static>(&self, task: Task<T>) -> Result<T, TaskError> {
        let handle = self.spawn(task);
        self.run();
        handle.result()
    }

    fn insert<T: 'static>(&self, mut task: Task<T>) -> usize {
        let future = poll_fn(move |cx| task.drive(cx)).boxed_local();
        let mut tasks = self.tasks.borrow_mut();
        let id = tasks
            .first_empty_slot_from(0)
            .unwrap_or_else(|| tasks.next_push_index());
        tasks.reserve_for(id);
        let slot = Slot {
            future: Some(future),
            waker: Arc::new(TaskWaker {
                id,
                queued: AtomicBool::new(false),
                ready: self.ready.clone(),
            }),
        };
        let old = tasks.insert(id, slot);
        assert!(old.is_none());
        id
    }

    fn schedule(&self, id: usize) {
        let waker = self.tasks.borrow().get(id).map(|slot| slot.waker.clone());
        if let Some(waker) = waker {
            ArcWake::wake_by_ref(&waker);
        }
    }

    fn run_task(&self, id: usize) {
        let (mut future, task_waker) = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(slot) = tasks.get_mut(id) else {
                // stale wake for a task that already finished
                return;
            };
            let Some(future) = slot.future.take() else {
                return;
            };
            (future, slot.waker.clone())
        };

        task_waker.queued.store(false, Ordering::Release);
        let waker = futures_util::task::waker(task_waker);
        let cx = &mut Context::from_waker(&waker);

        tracing::trace!(id, "poll");
        match future.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.tasks.borrow_mut().remove(id);
                tracing::trace!(id, "complete");
            }
            Poll::Pending => {
                if let Some(slot) = self.tasks.borrow_mut().get_mut(id) {
                    slot.future = Some(future);
                }
            }
        }
    }

    /// Register `waker` to be woken once `when` has passed.
    pub fn add_timer(&self, when: Instant, waker: Waker) -> TimerKey {
        let key = self.timers.borrow_mut().insert(when, waker);
        tracing::trace!(seq = key.seq, "timer registered");
        key
    }

    /// Drop a pending timer. Returns false if it already fired or was reset.
    pub fn remove_timer(&self, key: TimerKey) -> bool {
        self.timers.borrow_mut().remove(key).is_some()
    }

    pub(crate) fn timer_queue(&self) -> &Rc<RefCell<TimerQueue>> {
        &self.timers
    }

    /// Discard every pending timer. Tasks waiting on them are never resumed.
    pub fn reset(&self) {
        let discarded = self.timers.borrow_mut().clear();
        tracing::debug!(discarded, "timers reset");
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Tasks that have been spawned and not yet completed, including ones suspended forever.
    pub fn live_tasks(&self) -> usize {
        self.tasks.borrow().num_elements()
    }

    /// Drive the loop until both the ready queue and the timer set are empty.
    ///
    /// The ready queue is drained completely before timers are looked at. When only timers remain
    /// and the earliest one is not yet due, the thread blocks (through the loop's clock) until it
    /// is.
    ///
    /// Panics if a loop is already running on this thread.
    pub fn run(&self) {
        if CURRENT.is_set() {
            panic!("cannot run an event loop recursively");
        }
        let span = tracing::trace_span!("loop", label = %self.name);
        let _guard = span.enter();
        CURRENT.set(self, || self.drain());
        tracing::debug!(live = self.live_tasks(), "loop quiescent");
    }

    fn drain(&self) {
        loop {
            while let Some(id) = self.ready.pop() {
                self.run_task(id);
            }

            let next = self.timers.borrow().first();
            match next {
                Some(key) if self.clock.now() >= key.when => {
                    let waker = self.timers.borrow_mut().remove(key);
                    tracing::trace!(seq = key.seq, "timer fired");
                    if let Some(waker) = waker {
                        waker.wake();
                    }
                }
                Some(key) => self.clock.sleep_until(key.when),
                None if self.ready.is_empty() => break,
                None => {}
            }
        }
    }
}

impl Default for Loop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("name", &self.name)
            .field("live_tasks", &self.live_tasks())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}
