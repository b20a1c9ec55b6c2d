//! Completion future - the one-shot handle a caller awaits.
//!
//! The producer half ([`Completion`]) is held by the scheduler, never by the
//! record or the actor, and is only written while terminal records are routed
//! at the end of a tick. The consumer half ([`DoAfterHandle`]) is a plain [`Future`], so any
//! executor works; a single-threaded `LocalPool` polled between ticks gives
//! the "resume on a tick boundary" guarantee.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::{DoAfterError, DoAfterResult};
use crate::record::{DoAfterId, DoAfterStatus};

/// Create a linked producer/consumer pair for one record.
pub fn completion_pair(id: DoAfterId) -> (Completion, DoAfterHandle) {
    let (sender, receiver) = oneshot::channel();
    (
        Completion {
            id,
            sender: Some(sender),
        },
        DoAfterHandle {
            id,
            receiver,
            resolved: None,
        },
    )
}

/// Producer side. Resolves at most once.
///
/// Dropping an unresolved `Completion` (the scheduler itself went away)
/// makes the handle report [`DoAfterStatus::Cancelled`].
#[derive(Debug)]
pub struct Completion {
    id: DoAfterId,
    sender: Option<oneshot::Sender<DoAfterStatus>>,
}

impl Completion {
    pub fn resolve(&mut self, status: DoAfterStatus) -> DoAfterResult<()> {
        if !status.is_terminal() {
            return Err(DoAfterError::NotTerminal {
                id: self.id,
                status,
            });
        }
        let sender = self
            .sender
            .take()
            .ok_or(DoAfterError::AlreadyResolved { id: self.id })?;
        // The caller may have dropped its handle; the outcome still counts.
        let _ = sender.send(status);
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.is_none()
    }
}

/// Consumer side, returned by `initiate`.
#[derive(Debug)]
pub struct DoAfterHandle {
    id: DoAfterId,
    receiver: oneshot::Receiver<DoAfterStatus>,
    resolved: Option<DoAfterStatus>,
}

impl DoAfterHandle {
    pub fn id(&self) -> DoAfterId {
        self.id
    }

    /// Non-blocking peek. `None` while the action is still running.
    pub fn try_status(&mut self) -> Option<DoAfterStatus> {
        if self.resolved.is_none() {
            self.resolved = match self.receiver.try_recv() {
                Ok(status) => status,
                Err(oneshot::Canceled) => Some(DoAfterStatus::Cancelled),
            };
        }
        self.resolved
    }
}

impl Future for DoAfterHandle {
    type Output = DoAfterStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(status) = this.resolved {
            return Poll::Ready(status);
        }
        let status = match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(status)) => status,
            Poll::Ready(Err(oneshot::Canceled)) => DoAfterStatus::Cancelled,
            Poll::Pending => return Poll::Pending,
        };
        this.resolved = Some(status);
        Poll::Ready(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_resolve_once() {
        let (mut completion, mut handle) = completion_pair(DoAfterId(7));
        assert_eq!(handle.try_status(), None);

        completion.resolve(DoAfterStatus::Finished).unwrap();
        assert!(completion.is_resolved());
        assert_eq!(handle.try_status(), Some(DoAfterStatus::Finished));
        // Cached after the first observation
        assert_eq!(handle.try_status(), Some(DoAfterStatus::Finished));
        assert_eq!(block_on(handle), DoAfterStatus::Finished);
    }

    #[test]
    fn test_double_resolve_rejected() {
        let (mut completion, handle) = completion_pair(DoAfterId(1));
        completion.resolve(DoAfterStatus::Cancelled).unwrap();

        let err = completion.resolve(DoAfterStatus::Finished).unwrap_err();
        assert!(matches!(err, DoAfterError::AlreadyResolved { id } if id == DoAfterId(1)));
        // First resolution wins
        assert_eq!(block_on(handle), DoAfterStatus::Cancelled);
    }

    #[test]
    fn test_running_is_not_a_resolution() {
        let (mut completion, mut handle) = completion_pair(DoAfterId(2));
        let err = completion.resolve(DoAfterStatus::Running).unwrap_err();
        assert!(matches!(err, DoAfterError::NotTerminal { .. }));
        assert!(!completion.is_resolved());
        assert_eq!(handle.try_status(), None);
    }

    #[test]
    fn test_dropped_producer_reads_as_cancelled() {
        let (completion, handle) = completion_pair(DoAfterId(3));
        drop(completion);
        assert_eq!(block_on(handle), DoAfterStatus::Cancelled);
    }

    #[test]
    fn test_resolve_after_handle_dropped() {
        let (mut completion, handle) = completion_pair(DoAfterId(4));
        drop(handle);
        assert!(completion.resolve(DoAfterStatus::Finished).is_ok());
    }
}
