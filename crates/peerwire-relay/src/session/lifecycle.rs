//! Shared teardown state of one session.
//!
//! Every failure path funnels into [`Lifecycle::close`]. The first call wins:
//! it records the reason, moves the state to `Closing` and fires the
//! cancellation token that stops both the inbound pump and the writer. The
//! session supervisor then unsubscribes, closes the connection and marks the
//! session `Closed`.

use std::sync::OnceLock;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{CloseReason, SessionState};

pub(crate) struct Lifecycle {
    cancel: CancellationToken,
    reason: OnceLock<CloseReason>,
    state: watch::Sender<SessionState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            reason: OnceLock::new(),
            state: watch::Sender::new(SessionState::Open),
        }
    }

    /// Trigger teardown. Returns `true` only for the call that triggered it.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }
        self.state.send_if_modified(|state| {
            if *state == SessionState::Open {
                *state = SessionState::Closing;
                true
            } else {
                false
            }
        });
        self.cancel.cancel();
        true
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub(crate) fn mark_closed(&self) {
        self.state.send_replace(SessionState::Closed);
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn reason(&self) -> Option<&CloseReason> {
        self.reason.get()
    }

    pub(crate) async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // `self.state` outlives the receiver, so the channel cannot close under us.
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_close_wins() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), SessionState::Open);

        assert!(lifecycle.close(CloseReason::PeerHungUp));
        assert!(!lifecycle.close(CloseReason::Requested));

        assert_eq!(lifecycle.state(), SessionState::Closing);
        assert!(lifecycle.is_closing());
        assert!(matches!(lifecycle.reason(), Some(CloseReason::PeerHungUp)));
    }

    #[tokio::test]
    async fn closed_resolves_after_mark_closed() {
        let lifecycle = std::sync::Arc::new(Lifecycle::new());
        lifecycle.close(CloseReason::Requested);

        let waiter = {
            let lifecycle = std::sync::Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.closed().await })
        };
        lifecycle.mark_closed();

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .expect("waiter task should not panic");
        assert_eq!(lifecycle.state(), SessionState::Closed);
    }
}
