use core::cell::{RefCell, UnsafeCell};
use core::future::poll_fn;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::task::{Poll, Waker};

struct MutexState {
    locked: bool,
    waker: Option<Waker>,
}

/// An async mutex, independent of the executor.
///
/// Synchronizes futures of one task that run concurrently through
/// [`select`](super::select) or [`join`](super::join). It is not `Sync`.
pub struct Mutex<T> {
    value: UnsafeCell<T>,
    state: RefCell<MutexState>,
    _not_sync: PhantomData<*mut T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Mutex {
            value: UnsafeCell::new(value),
            state: RefCell::new(MutexState {
                locked: false,
                waker: None,
            }),
            _not_sync: PhantomData,
        }
    }

    /// Wait until the lock is free and take it.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        poll_fn(|cx| {
            let mut state = self.state.borrow_mut();
            if !state.locked {
                state.locked = true;
                return Poll::Ready(());
            }

            // Keep a single waker around. A different waiter gets woken, so
            // it can register itself again once the lock is released.
            match &mut state.waker {
                Some(waker) if waker.will_wake(cx.waker()) => {}
                slot => {
                    if let Some(previous) = slot.replace(cx.waker().clone()) {
                        previous.wake();
                    }
                }
            }

            Poll::Pending
        })
        .await;

        MutexGuard { mutex: self }
    }

    /// Take the lock if it is free.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.borrow_mut();
        if state.locked {
            None
        } else {
            state.locked = true;
            Some(MutexGuard { mutex: self })
        }
    }

    /// Return whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    /// Access the protected value through an exclusive reference.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consume the mutex and return the protected value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// Exclusive access to the value protected by a [`Mutex`].
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: the guard is the only holder of the lock.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: the guard is the only holder of the lock.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.mutex.state.borrow_mut();
        state.locked = false;

        if let Some(waker) = state.waker.take() {
            waker.wake()
        }
    }
}
