use std::{cell::RefCell, rc::Rc};

use crate::{
    relay::{relay, AllBlock, Gather},
    task::Task,
};

/// Tuples of tasks that can be joined with [`when_all`]. Implemented for tuples of one to eight
/// tasks; the empty tuple is deliberately left out.
///
/// ```compile_fail
/// let _ = coloop::when_all(());
/// ```
pub trait WhenAll {
    type Output;

    fn when_all(self) -> Task<Self::Output>;
}

/// Combine tasks into one that completes after every one of them has.
///
/// The output holds each child's value at the child's position; `()` results stay in place as
/// `()`. A child that fails is not reported: its failure stays in its own result cell, and the
/// combined task never completes.
///
/// ```
/// use std::time::Duration;
/// use coloop::{sleep_for, when_all, Loop, Task};
///
/// let lp = Loop::new();
/// let (a, b) = lp
///     .block_on(when_all((
///         Task::new(async {
///             sleep_for(Duration::from_millis(2)).await;
///             1
///         }),
///         Task::new(async { "two" }),
///     )))
///     .unwrap();
/// assert_eq!((a, b), (1, "two"));
/// ```
pub fn when_all<S: WhenAll>(tasks: S) -> Task<S::Output> {
    tasks.when_all()
}

fn take_slot<T>(slot: &RefCell<Option<T>>) -> T {
    slot.borrow_mut()
        .take()
        .expect("when_all resumed before every child reported")
}

macro_rules! impl_when_all {
    ($count:expr; $($idx:tt $T:ident $t:ident $slot:ident),+) => {
        impl<$($T: 'static),+> WhenAll for ($(Task<$T>,)+) {
            type Output = ($($T,)+);

            fn when_all(self) -> Task<Self::Output> {
                let ($($t,)+) = self;
                Task::new(async move {
                    let block = Rc::new(AllBlock::new($count));
                    $(
                        let $slot = Rc::new(RefCell::new(None));
                        let $t = {
                            let slot = $slot.clone();
                            let block = block.clone();
                            relay($t, $idx, move |value: $T| {
                                *slot.borrow_mut() = Some(value);
                                block.arrive();
                            })
                        };
                    )+
                    Gather::new(block, vec![$($t),+]).await;
                    tracing::trace!(children = $count, "when_all complete");
                    ($(take_slot(&$slot),)+)
                })
            }
        }
    };
}

impl_when_all!(1; 0 A a sa);
impl_when_all!(2; 0 A a sa, 1 B b sb);
impl_when_all!(3; 0 A a sa, 1 B b sb, 2 C c sc);
impl_when_all!(4; 0 A a sa, 1 B b sb, 2 C c sc, 3 D d sd);
impl_when_all!(5; 0 A a sa, 1 B b sb, 2 C c sc, 3 D d sd, 4 E e se);
impl_when_all!(6; 0 A a sa, 1 B b sb, 2 C c sc, 3 D d sd, 4 E e se, 5 F f sf);
impl_when_all!(7; 0 A a sa, 1 B b sb, 2 C c sc, 3 D d sd, 4 E e se, 5 F f sf, 6 G g sg);
impl_when_all!(8; 0 A a sa, 1 B b sb, 2 C c sc, 3 D d sd, 4 E e se, 5 F f sf, 6 G g sg, 7 H h sh);
