//! Completion signal - チェーンの結果を起動元に届ける
//!
//! 一回限りのチャネル（tokio oneshot）で、同期でも非同期でも待てます：
//!
//! - `wait()`: スレッドをブロックして待つ（primary スレッド以外で使う）
//! - `try_outcome()`: ポーリング（primary ループで tick しながら使う）
//! - `.await`: `CompletionHandle` 自体が Future

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::domain::{ChainError, ChainId, ChainOutcome};

/// Sending half, owned by the chain.
#[derive(Debug)]
pub(crate) struct Completion {
    tx: oneshot::Sender<ChainOutcome>,
}

impl Completion {
    pub(crate) fn channel(chain_id: ChainId) -> (Self, CompletionHandle) {
        let (tx, rx) = oneshot::channel();
        (
            Self { tx },
            CompletionHandle {
                chain_id,
                rx,
                received: None,
            },
        )
    }

    /// Deliver the outcome. Consumes the sender, so it happens at most once.
    pub(crate) fn fulfill(self, outcome: ChainOutcome) {
        // The initiator may have stopped listening; that is fine.
        let _ = self.tx.send(outcome);
    }
}

/// Receiving half, held by whoever started the chain.
///
/// Dropping the handle does not cancel the chain.
#[derive(Debug)]
pub struct CompletionHandle {
    chain_id: ChainId,
    rx: oneshot::Receiver<ChainOutcome>,
    received: Option<ChainOutcome>,
}

impl CompletionHandle {
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Block the calling thread until the chain finishes.
    ///
    /// Do not call this on the primary thread while the chain still has
    /// primary-context tasks to run: nobody would drain them. Poll with
    /// `try_outcome` from the primary loop instead.
    ///
    /// # Panics
    /// Panics when called inside an async runtime; `.await` the handle there.
    pub fn wait(self) -> Result<ChainOutcome, ChainError> {
        if let Some(outcome) = self.received {
            return Ok(outcome);
        }
        self.rx
            .blocking_recv()
            .map_err(|_| ChainError::Abandoned(self.chain_id))
    }

    /// Non-blocking check. `Ok(None)` while the chain is still running.
    pub fn try_outcome(&mut self) -> Result<Option<ChainOutcome>, ChainError> {
        if let Some(outcome) = self.received {
            return Ok(Some(outcome));
        }
        match self.rx.try_recv() {
            Ok(outcome) => {
                self.received = Some(outcome);
                Ok(Some(outcome))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(ChainError::Abandoned(self.chain_id)),
        }
    }
}

impl Future for CompletionHandle {
    type Output = Result<ChainOutcome, ChainError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.received {
            return Poll::Ready(Ok(outcome));
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                this.received = Some(outcome);
                Poll::Ready(Ok(outcome))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChainError::Abandoned(this.chain_id))),
            Poll::Pending => Poll::Pending,
        }
    }
}
