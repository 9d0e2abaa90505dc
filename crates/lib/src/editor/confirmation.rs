//! Futures resolving when a local edit has been stored by the authority.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::EditorError;
use crate::Result;

/// Resolves once the edit returned by `Editor::apply` is confirmed.
///
/// Fails with [`EditorError::Abandoned`] when the editor is reset first.
#[derive(Debug)]
#[must_use = "a confirmation does nothing unless awaited or polled"]
pub struct Confirmation {
    receiver: oneshot::Receiver<()>,
    confirmed: bool,
}

impl Confirmation {
    pub(crate) fn pending() -> (oneshot::Sender<()>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                receiver,
                confirmed: false,
            },
        )
    }

    pub(crate) fn resolved() -> Self {
        let (sender, confirmation) = Self::pending();
        let _ = sender.send(());
        confirmation
    }

    /// Check without waiting. `Ok(false)` means still pending.
    pub fn try_confirmed(&mut self) -> Result<bool> {
        if self.confirmed {
            return Ok(true);
        }
        match self.receiver.try_recv() {
            Ok(()) => {
                self.confirmed = true;
                Ok(true)
            }
            Err(oneshot::error::TryRecvError::Empty) => Ok(false),
            Err(oneshot::error::TryRecvError::Closed) => Err(EditorError::Abandoned.into()),
        }
    }
}

impl Future for Confirmation {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.confirmed {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(())) => {
                self.confirmed = true;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(EditorError::Abandoned.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}
