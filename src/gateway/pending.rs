use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

use super::GatewayError;

struct Slot<T> {
    result: Option<Result<T, GatewayError>>,
    waker: Option<Waker>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// Handle to a gateway operation that completes on the engine worker.
///
/// Block with [`PendingOp::wait`], poll with [`PendingOp::try_take`], or
/// `.await` it from any executor. Native work cannot be interrupted once it
/// starts, so there is no cancel: dropping the handle only discards the result.
#[must_use = "a pending operation reports its failure only through its result"]
pub struct PendingOp<T> {
    shared: Arc<Shared<T>>,
}

/// Worker-side half that resolves the matching [`PendingOp`].
///
/// Dropping it unresolved resolves the operation with [`GatewayError::WorkerGone`].
pub(crate) struct Completion<T> {
    shared: Option<Arc<Shared<T>>>,
}

pub(crate) fn pending<T>() -> (Completion<T>, PendingOp<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            result: None,
            waker: None,
        }),
        ready: Condvar::new(),
    });
    (
        Completion {
            shared: Some(Arc::clone(&shared)),
        },
        PendingOp { shared },
    )
}

impl<T> PendingOp<T> {
    /// An operation that already finished, e.g. rejected during validation.
    pub(crate) fn ready(result: Result<T, GatewayError>) -> Self {
        let (completion, op) = pending();
        completion.complete(result);
        op
    }

    /// Block the calling thread until the operation finishes.
    pub fn wait(self) -> Result<T, GatewayError> {
        let Ok(mut slot) = self.shared.slot.lock() else {
            return Err(GatewayError::WorkerGone);
        };
        loop {
            if let Some(result) = slot.result.take() {
                return result;
            }
            slot = match self.shared.ready.wait(slot) {
                Ok(slot) => slot,
                Err(_) => return Err(GatewayError::WorkerGone),
            };
        }
    }

    /// Take the result if the operation has finished.
    pub fn try_take(&mut self) -> Option<Result<T, GatewayError>> {
        match self.shared.slot.lock() {
            Ok(mut slot) => slot.result.take(),
            Err(_) => Some(Err(GatewayError::WorkerGone)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared
            .slot
            .lock()
            .map(|slot| slot.result.is_some())
            .unwrap_or(true)
    }
}

impl<T> Future for PendingOp<T> {
    type Output = Result<T, GatewayError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Ok(mut slot) = self.shared.slot.lock() else {
            return Poll::Ready(Err(GatewayError::WorkerGone));
        };
        match slot.result.take() {
            Some(result) => Poll::Ready(result),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> Completion<T> {
    pub(crate) fn complete(mut self, result: Result<T, GatewayError>) {
        self.resolve(result);
    }

    fn resolve(&mut self, result: Result<T, GatewayError>) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        let waker = match shared.slot.lock() {
            Ok(mut slot) => {
                slot.result = Some(result);
                slot.waker.take()
            }
            Err(_) => None,
        };
        shared.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        self.resolve(Err(GatewayError::WorkerGone));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;
    use std::thread;
    use std::time::Duration;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn wait_blocks_until_completed_elsewhere() {
        let (completion, op) = pending::<u32>();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completion.complete(Ok(42));
        });
        assert_eq!(op.wait().unwrap(), 42);
        handle.join().unwrap();
    }

    #[test]
    fn try_take_is_empty_until_ready() {
        let (completion, mut op) = pending::<u32>();
        assert!(op.try_take().is_none());
        assert!(!op.is_ready());
        completion.complete(Ok(1));
        assert!(op.is_ready());
        assert_eq!(op.try_take().unwrap().unwrap(), 1);
    }

    #[test]
    fn dropped_completion_reports_worker_gone() {
        let (completion, op) = pending::<()>();
        drop(completion);
        assert!(matches!(op.wait(), Err(GatewayError::WorkerGone)));
    }

    #[test]
    fn poll_registers_waker_and_wakes_on_completion() {
        let (completion, mut op) = pending::<&'static str>();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut op).poll(&mut cx).is_pending());
        completion.complete(Ok("done"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        match Pin::new(&mut op).poll(&mut cx) {
            Poll::Ready(Ok(value)) => assert_eq!(value, "done"),
            other => panic!("unexpected poll result: {:?}", other.is_ready()),
        }
    }
}
