use std::{cell::RefCell, rc::Rc};

use crate::{
    exec::Loop,
    relay::{relay, AnyBlock, Completion, Gather},
    task::Task,
};

/// Tuples of tasks that can be raced with [`when_any`]. Implemented for tuples of one to eight
/// tasks; the empty tuple is deliberately left out.
///
/// ```compile_fail
/// let _ = coloop::when_any(());
/// ```
pub trait WhenAny {
    type Output;

    fn when_any(self) -> Task<Self::Output>;
}

/// Combine tasks into one that completes as soon as the first of them does, carrying that child's
/// value tagged with its position.
///
/// Once the winner is known, every pending timer on the loop is discarded, so losers suspended on
/// timers are never resumed. Losers that are already on the ready queue are not cancelled: they
/// run to completion and their values are dropped.
///
/// ```
/// use std::time::Duration;
/// use coloop::{sleep_for, when_any, AnyOf2, Loop, Task};
///
/// let lp = Loop::new();
/// let winner = lp
///     .block_on(when_any((
///         Task::new(async {
///             sleep_for(Duration::from_secs(60)).await;
///             "slow"
///         }),
///         Task::new(async {
///             sleep_for(Duration::from_millis(1)).await;
///             7
///         }),
///     )))
///     .unwrap();
/// assert_eq!(winner, AnyOf2::Second(7));
/// ```
pub fn when_any<S: WhenAny>(tasks: S) -> Task<S::Output> {
    tasks.when_any()
}

macro_rules! any_of {
    ($(#[$m:meta])* $name:ident; $($idx:tt $V:ident $T:ident),+) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name<$($T),+> {
            $($V($T)),+
        }

        impl<$($T),+> $name<$($T),+> {
            /// Position of the winning task in the input tuple.
            pub fn index(&self) -> usize {
                match self {
                    $(Self::$V(_) => $idx),+
                }
            }
        }
    };
}

any_of!(
    /// Output of [`when_any`] over one task.
    AnyOf1; 0 First A
);
any_of!(
    /// Output of [`when_any`] over two tasks.
    AnyOf2; 0 First A, 1 Second B
);
any_of!(
    /// Output of [`when_any`] over three tasks.
    AnyOf3; 0 First A, 1 Second B, 2 Third C
);
any_of!(
    /// Output of [`when_any`] over four tasks.
    AnyOf4; 0 First A, 1 Second B, 2 Third C, 3 Fourth D
);
any_of!(
    /// Output of [`when_any`] over five tasks.
    AnyOf5; 0 First A, 1 Second B, 2 Third C, 3 Fourth D, 4 Fifth E
);
any_of!(
    /// Output of [`when_any`] over six tasks.
    AnyOf6; 0 First A, 1 Second B, 2 Third C, 3 Fourth D, 4 Fifth E, 5 Sixth F
);
any_of!(
    /// Output of [`when_any`] over seven tasks.
    AnyOf7; 0 First A, 1 Second B, 2 Third C, 3 Fourth D, 4 Fifth E, 5 Sixth F, 6 Seventh G
);
any_of!(
    /// Output of [`when_any`] over eight tasks.
    AnyOf8; 0 First A, 1 Second B, 2 Third C, 3 Fourth D, 4 Fifth E, 5 Sixth F, 6 Seventh G,
    7 Eighth H
);

macro_rules! impl_when_any {
    ($name:ident; $($idx:tt $V:ident $T:ident $t:ident),+) => {
        impl<$($T: 'static),+> WhenAny for ($(Task<$T>,)+) {
            type Output = $name<$($T),+>;

            fn when_any(self) -> Task<Self::Output> {
                let ($($t,)+) = self;
                Task::new(async move {
                    let block = Rc::new(AnyBlock::new());
                    let winner = Rc::new(RefCell::new(None));
                    $(
                        let $t = {
                            let block = block.clone();
                            let winner = winner.clone();
                            relay($t, $idx, move |value: $T| {
                                if !block.is_done() {
                                    *winner.borrow_mut() = Some($name::$V(value));
                                    block.win($idx);
                                }
                            })
                        };
                    )+
                    Gather::new(block.clone(), vec![$($t),+]).await;
                    tracing::trace!(winner = ?block.winner(), "when_any complete");
                    Loop::with_current(Loop::reset);
                    let out = winner
                        .borrow_mut()
                        .take()
                        .expect("when_any resumed without a winner");
                    out
                })
            }
        }
    };
}

impl_when_any!(AnyOf1; 0 First A a);
impl_when_any!(AnyOf2; 0 First A a, 1 Second B b);
impl_when_any!(AnyOf3; 0 First A a, 1 Second B b, 2 Third C c);
impl_when_any!(AnyOf4; 0 First A a, 1 Second B b, 2 Third C c, 3 Fourth D d);
impl_when_any!(AnyOf5; 0 First A a, 1 Second B b, 2 Third C c, 3 Fourth D d, 4 Fifth E e);
impl_when_any!(AnyOf6; 0 First A a, 1 Second B b, 2 Third C c, 3 Fourth D d, 4 Fifth E e,
    5 Sixth F f);
impl_when_any!(AnyOf7; 0 First A a, 1 Second B b, 2 Third C c, 3 Fourth D d, 4 Fifth E e,
    5 Sixth F f, 6 Seventh G g);
impl_when_any!(AnyOf8; 0 First A a, 1 Second B b, 2 Third C c, 3 Fourth D d, 4 Fifth E e,
    5 Sixth F f, 6 Seventh G g, 7 Eighth H h);
