use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use super::Either;

/// Wait for the first of two futures to complete. The other one is dropped,
/// which cancels it.
pub fn select<F1: Future, F2: Future>(f1: F1, f2: F2) -> Select<F1, F2> {
    Select { f1, f2 }
}

/// Future returned by [`select`].
pub struct Select<F1, F2> {
    f1: F1,
    f2: F2,
}

impl<F1: Future, F2: Future> Future for Select<F1, F2> {
    type Output = Either<F1::Output, F2::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Safety: neither field is moved out of the pinned struct.
        let this = unsafe { self.get_unchecked_mut() };
        let f1 = unsafe { Pin::new_unchecked(&mut this.f1) };
        if let Poll::Ready(output) = f1.poll(cx) {
            return Poll::Ready(Either::First(output));
        }

        let f2 = unsafe { Pin::new_unchecked(&mut this.f2) };
        if let Poll::Ready(output) = f2.poll(cx) {
            return Poll::Ready(Either::Second(output));
        }

        Poll::Pending
    }
}
