use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// Wait for both futures to complete.
pub fn join<F1: Future, F2: Future>(f1: F1, f2: F2) -> Join<F1, F2> {
    Join {
        f1: MaybeDone::Pending(f1),
        f2: MaybeDone::Pending(f2),
    }
}

enum MaybeDone<F: Future> {
    Pending(F),
    Done(F::Output),
    Taken,
}

impl<F: Future> MaybeDone<F> {
    /// Safety: `self` must be pinned.
    unsafe fn poll(&mut self, cx: &mut Context<'_>) -> bool {
        match self {
            MaybeDone::Pending(f) => match Pin::new_unchecked(f).poll(cx) {
                Poll::Ready(output) => {
                    *self = MaybeDone::Done(output);
                    true
                }
                Poll::Pending => false,
            },
            _ => true,
        }
    }

    fn take(&mut self) -> Option<F::Output> {
        match core::mem::replace(self, MaybeDone::Taken) {
            MaybeDone::Done(output) => Some(output),
            _ => None,
        }
    }
}

/// Future returned by [`join`].
pub struct Join<F1: Future, F2: Future> {
    f1: MaybeDone<F1>,
    f2: MaybeDone<F2>,
}

impl<F1: Future, F2: Future> Future for Join<F1, F2> {
    type Output = (F1::Output, F2::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Safety: the futures are not moved until they are done.
        let this = unsafe { self.get_unchecked_mut() };
        let done1 = unsafe { this.f1.poll(cx) };
        let done2 = unsafe { this.f2.poll(cx) };

        if !(done1 && done2) {
            return Poll::Pending;
        }

        match (this.f1.take(), this.f2.take()) {
            (Some(o1), Some(o2)) => Poll::Ready((o1, o2)),
            _ => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use core::future::poll_fn;
    use core::task::Poll;

    use pollster::FutureExt as _;

    use super::*;

    #[test]
    pub fn both_ready() {
        async {
            let f1 = poll_fn(|_| Poll::Ready(1));
            let f2 = poll_fn(|_| Poll::Ready(2));
            assert_eq!(join(f1, f2).await, (1, 2));
        }
        .block_on();
    }

    #[test]
    pub fn waits_for_the_slower_one() {
        async {
            let mut counter = 10;
            let f1 = poll_fn(move |cx| {
                if counter == 0 {
                    Poll::Ready(())
                } else {
                    counter -= 1;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            });
            let f2 = poll_fn(|_| Poll::Ready(()));
            assert_eq!(join(f1, f2).await, ((), ()));
        }
        .block_on();
    }
}
