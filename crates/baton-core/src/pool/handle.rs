//! ItemHandle - 単体のワークアイテムの完了を待つ
//!
//! `WorkerPool::call_in_worker` が返します。CompletionHandle と同じく
//! tokio oneshot で、ブロック・ポーリング・`.await` のどれでも待てます。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot::{self, error::TryRecvError};

use super::WorkItem;
use crate::domain::{ItemError, WorkItemId};

/// Completion of one background job.
///
/// Dropping the handle does not cancel the job.
#[derive(Debug)]
pub struct ItemHandle {
    item: WorkItemId,
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl ItemHandle {
    /// Wrap `job` in a background item that reports to the returned handle.
    pub(crate) fn track(job: impl FnOnce() + Send + 'static) -> (Arc<WorkItem>, Self) {
        let (tx, rx) = oneshot::channel();
        let item = WorkItem::background(move || {
            job();
            let _ = tx.send(());
        });
        let handle = Self {
            item: item.id(),
            rx,
            done: false,
        };
        (item, handle)
    }

    pub fn item_id(&self) -> WorkItemId {
        self.item
    }

    /// Block until the job has run.
    ///
    /// # Panics
    /// Panics when called inside an async runtime; `.await` the handle there.
    pub fn wait(self) -> Result<(), ItemError> {
        if self.done {
            return Ok(());
        }
        let item = self.item;
        self.rx.blocking_recv().map_err(|_| ItemError::Dropped(item))
    }

    /// Non-blocking check.
    pub fn is_done(&mut self) -> Result<bool, ItemError> {
        if self.done {
            return Ok(true);
        }
        match self.rx.try_recv() {
            Ok(()) => {
                self.done = true;
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Closed) => Err(ItemError::Dropped(self.item)),
        }
    }
}

impl Future for ItemHandle {
    type Output = Result<(), ItemError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(())) => {
                this.done = true;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(ItemError::Dropped(this.item))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_completes_when_the_item_runs() {
        let (item, mut handle) = ItemHandle::track(|| {});
        assert_eq!(handle.item_id(), item.id());
        assert_eq!(handle.is_done(), Ok(false));

        assert!(item.process());
        assert_eq!(handle.is_done(), Ok(true));
        assert_eq!(handle.is_done(), Ok(true));
        assert_eq!(handle.wait(), Ok(()));
    }

    #[test]
    fn dropped_item_is_reported() {
        let (item, handle) = ItemHandle::track(|| {});
        let id = item.id();
        drop(item);

        assert_eq!(handle.wait(), Err(ItemError::Dropped(id)));
    }

    #[tokio::test]
    async fn handle_can_be_awaited() {
        let (item, handle) = ItemHandle::track(|| {});
        std::thread::spawn(move || item.process());
        assert_eq!(handle.await, Ok(()));
    }
}
