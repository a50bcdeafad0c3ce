use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::{
    sleep_for, when_all, when_any, AnyOf2, AnyOf3, Loop, ManualClock, State, Task, TaskError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn manual_loop() -> (Loop, ManualClock) {
    init_tracing();
    let clock = ManualClock::new();
    let lp = Loop::builder()
        .name("scenario")
        .clock(clock.clone())
        .build();
    (lp, clock)
}

fn hello1() -> Task<i32> {
    Task::new(async {
        sleep_for(Duration::from_secs(1)).await;
        1
    })
}

fn hello2() -> Task<i32> {
    Task::new(async {
        sleep_for(Duration::from_secs(2)).await;
        2
    })
}

fn hello3() -> Task<()> {
    Task::new(async {
        sleep_for(Duration::from_secs(3)).await;
    })
}

#[test]
fn all_three_sleepers() {
    let (lp, clock) = manual_loop();
    let total = lp
        .block_on(Task::new(async {
            let (i, j, ()) = when_all((hello1(), hello2(), hello3())).await;
            i + j
        }))
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
    assert_eq!(lp.live_tasks(), 0);
}

#[test]
fn first_of_three_sleepers() {
    let (lp, clock) = manual_loop();
    let winner = lp.block_on(when_any((hello1(), hello2(), hello3()))).unwrap();
    assert_eq!(winner, AnyOf3::First(1));
    assert_eq!(clock.elapsed(), Duration::from_secs(1));
    assert_eq!(lp.pending_timers(), 0);
}

#[test]
fn first_of_reordered_sleepers() {
    let (lp, _clock) = manual_loop();
    let value = lp
        .block_on(Task::new(async {
            match when_any((hello2(), hello1(), hello3())).await {
                AnyOf3::Second(v) => v,
                other => panic!("unexpected winner {}", other.index()),
            }
        }))
        .unwrap();
    assert_eq!(value, 1);
}

#[test]
fn race_and_join_one_and_two_units() {
    let unit = Duration::from_secs(1);

    let (lp, clock) = manual_loop();
    lp.block_on(when_all((sleep_for(unit), sleep_for(2 * unit))))
        .unwrap();
    assert_eq!(clock.elapsed(), 2 * unit);

    let (lp, clock) = manual_loop();
    let out = lp
        .block_on(when_any((sleep_for(unit), sleep_for(2 * unit))))
        .unwrap();
    assert_eq!(out, AnyOf2::First(()));
    assert_eq!(clock.elapsed(), unit);
    assert_eq!(lp.pending_timers(), 0);
}

#[test]
fn combinators_nest() {
    let (lp, clock) = manual_loop();
    let out = lp
        .block_on(Task::new(async {
            let fast_pair = when_all((hello1(), hello2()));
            let race = when_any((fast_pair, hello3()));
            race.await
        }))
        .unwrap();
    assert_eq!(out, AnyOf2::First((1, 2)));
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
}

#[test]
fn nested_await_runs_in_sequence() {
    let (lp, clock) = manual_loop();
    let sum = lp
        .block_on(Task::new(async {
            let a = hello1().await;
            let b = hello2().await;
            a + b
        }))
        .unwrap();
    assert_eq!(sum, 3);
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
}

#[test]
fn awaited_failure_surfaces_at_the_top() {
    let (lp, _clock) = manual_loop();
    let res = lp.block_on(Task::new(async {
        let child = Task::new(async {
            sleep_for(Duration::from_secs(1)).await;
            if true {
                panic!("child gave up");
            }
            0
        });
        child.await + 1
    }));
    match res {
        Err(TaskError::Panicked(f)) => assert_eq!(f.message(), Some("child gave up")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn detached_tasks_finish_in_background() {
    let (lp, clock) = manual_loop();
    let log = Rc::new(RefCell::new(vec![]));
    let inner_log = log.clone();
    let root = lp.spawn(Task::new(async move {
        let bg_log = inner_log.clone();
        let bg = Task::new(async move {
            sleep_for(Duration::from_secs(5)).await;
            bg_log.borrow_mut().push("background");
            5
        })
        .detach();
        inner_log.borrow_mut().push("root");
        bg
    }));
    lp.run();
    let bg = root.result().unwrap();
    assert_eq!(bg.result().unwrap(), 5);
    assert_eq!(*log.borrow(), vec!["root", "background"]);
    assert_eq!(clock.elapsed(), Duration::from_secs(5));
}

#[test]
fn task_states() {
    let (lp, _clock) = manual_loop();
    let states = Rc::new(RefCell::new(vec![]));
    let seen = states.clone();
    lp.block_on(Task::new(async move {
        let mut child = hello1();
        seen.borrow_mut().push(child.state());
        std::future::poll_fn(|cx| {
            assert!(child.drive(cx).is_pending());
            std::task::Poll::Ready(())
        })
        .await;
        seen.borrow_mut().push(child.state());
        let v = (&mut child).await;
        seen.borrow_mut().push(child.state());
        v
    }))
    .unwrap();
    assert_eq!(
        *states.borrow(),
        vec![State::Created, State::Suspended, State::Completed]
    );
}

#[test]
fn wall_clock_timing() {
    init_tracing();
    let lp = Loop::new();
    let start = Instant::now();
    lp.block_on(when_all((
        sleep_for(Duration::from_millis(20)),
        sleep_for(Duration::from_millis(40)),
    )))
    .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(40));

    let start = Instant::now();
    let out = lp
        .block_on(when_any((
            sleep_for(Duration::from_millis(20)),
            sleep_for(Duration::from_secs(30)),
        )))
        .unwrap();
    assert_eq!(out.index(), 0);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(20));
    assert!(elapsed < Duration::from_secs(30));
}
