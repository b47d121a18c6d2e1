//! Executor independent synchronization primitives.
//!
//! These synchronize different parts of a single task, for example the
//! receive path and a management request racing each other in a `select`.
pub mod channel;
pub mod join;
pub mod mutex;
pub mod select;
pub mod yield_now;


pub use channel::{Channel, Receiver, Sender};
pub use join::join;
pub use mutex::{Mutex, MutexGuard};
pub use select::select;
pub use yield_now::yield_now;

/// One of two possible outcomes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Either<T, S> {
    First(T),
    Second(S),
}

impl<T, S> Either<T, S> {
    pub fn is_first(&self) -> bool {
        matches!(self, Either::First(_))
    }

    pub fn is_second(&self) -> bool {
        matches!(self, Either::Second(_))
    }
}
