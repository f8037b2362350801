use core::fmt;

use bitcoin::Txid;
use log::debug;
use serde_derive::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::channel::ChannelId;
use crate::error::{broadcast_failed, ChannelError};

/// How a channel is being closed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseKind {
    /// Negotiated with the counterparty
    Cooperative,
    /// Our latest commitment transaction, broadcast unilaterally
    Force,
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CloseKind::Cooperative => write!(f, "cooperative"),
            CloseKind::Force => write!(f, "force"),
        }
    }
}

/// Progress of a close attempt
#[derive(Clone, Debug, PartialEq)]
pub enum CloseStatus {
    /// Still negotiating or broadcasting
    Pending,
    /// The closing transaction was handed to the network
    Broadcast(Txid),
    /// The attempt failed, the channel state is unchanged
    Failed(ChannelError),
}

/// The caller's view of a close attempt.
///
/// Dropping the handle does not cancel the attempt.
#[derive(Clone, Debug)]
pub struct CloseHandle {
    channel_id: ChannelId,
    kind: CloseKind,
    rx: watch::Receiver<CloseStatus>,
}

impl CloseHandle {
    /// A handle for an attempt that is already finished
    pub(crate) fn resolved(channel_id: ChannelId, kind: CloseKind, status: CloseStatus) -> Self {
        let (_tx, rx) = watch::channel(status);
        CloseHandle { channel_id, kind, rx }
    }

    /// The channel being closed
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// The kind of close
    pub fn kind(&self) -> CloseKind {
        self.kind
    }

    /// The current status, without waiting
    pub fn status(&self) -> CloseStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the attempt finishes
    pub async fn outcome(mut self) -> Result<Txid, ChannelError> {
        loop {
            let status = self.rx.borrow_and_update().clone();
            match status {
                CloseStatus::Broadcast(txid) => return Ok(txid),
                CloseStatus::Failed(e) => return Err(e),
                CloseStatus::Pending => {}
            }
            if self.rx.changed().await.is_err() {
                // the reporter went away, take whatever was last sent
                return match self.status() {
                    CloseStatus::Broadcast(txid) => Ok(txid),
                    CloseStatus::Failed(e) => Err(e),
                    CloseStatus::Pending => Err(broadcast_failed(format!(
                        "{} close of {} abandoned",
                        self.kind, self.channel_id
                    ))),
                };
            }
        }
    }
}

/// The in-flight attempt, as remembered by the channel
#[derive(Clone, Debug)]
pub(crate) struct PendingClose {
    pub kind: CloseKind,
    rx: watch::Receiver<CloseStatus>,
}

impl PendingClose {
    /// Another handle on the same attempt
    pub fn handle(&self, channel_id: ChannelId) -> CloseHandle {
        CloseHandle { channel_id, kind: self.kind, rx: self.rx.clone() }
    }
}

/// The task side of a close attempt
pub(crate) struct CloseReporter {
    channel_id: ChannelId,
    tx: watch::Sender<CloseStatus>,
}

impl CloseReporter {
    /// Publish the final outcome
    pub fn report(self, outcome: &Result<Txid, ChannelError>) {
        let status = match outcome {
            Ok(txid) => CloseStatus::Broadcast(*txid),
            Err(e) => CloseStatus::Failed(e.clone()),
        };
        debug!("close of {} finished: {:?}", self.channel_id, status);
        // handles may all be gone
        let _ = self.tx.send(status);
    }
}

/// What a channel hands back when asked to start closing
pub(crate) enum CloseStart<W> {
    /// An attempt is already in flight or done
    Existing(CloseHandle),
    /// A new attempt.  The caller performs `work` and reports through
    /// `reporter`.
    New { reporter: CloseReporter, handle: CloseHandle, work: W },
}

/// Create the plumbing for a new attempt
pub(crate) fn new_attempt(
    channel_id: ChannelId,
    kind: CloseKind,
) -> (CloseReporter, CloseHandle, PendingClose) {
    let (tx, rx) = watch::channel(CloseStatus::Pending);
    let handle = CloseHandle { channel_id, kind, rx: rx.clone() };
    (CloseReporter { channel_id, tx }, handle, PendingClose { kind, rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{counterparty_rejected, ChannelErrorKind};
    use bitcoin::hashes::Hash;

    fn id() -> ChannelId {
        ChannelId::new([9; 32])
    }

    #[tokio::test]
    async fn outcome_after_report_test() {
        let (reporter, handle, pending) = new_attempt(id(), CloseKind::Cooperative);
        let second = pending.handle(id());
        assert_eq!(handle.status(), CloseStatus::Pending);
        let txid = Txid::from_byte_array([4; 32]);
        let waiter = tokio::spawn(handle.outcome());
        reporter.report(&Ok(txid));
        assert_eq!(waiter.await.unwrap(), Ok(txid));
        assert_eq!(second.status(), CloseStatus::Broadcast(txid));
        assert_eq!(second.outcome().await, Ok(txid));
    }

    #[tokio::test]
    async fn failed_outcome_test() {
        let (reporter, handle, _pending) = new_attempt(id(), CloseKind::Cooperative);
        reporter.report(&Err(counterparty_rejected("no")));
        let err = handle.outcome().await.unwrap_err();
        assert_eq!(err.kind, ChannelErrorKind::CounterpartyRejected("no".into()));
    }

    #[tokio::test]
    async fn abandoned_attempt_test() {
        let (reporter, handle, _pending) = new_attempt(id(), CloseKind::Force);
        drop(reporter);
        let err = handle.outcome().await.unwrap_err();
        assert!(matches!(err.kind, ChannelErrorKind::BroadcastFailed(_)));
    }

    #[tokio::test]
    async fn resolved_handle_test() {
        let txid = Txid::from_byte_array([5; 32]);
        let handle = CloseHandle::resolved(id(), CloseKind::Force, CloseStatus::Broadcast(txid));
        assert_eq!(handle.kind(), CloseKind::Force);
        assert_eq!(handle.outcome().await, Ok(txid));
    }
}
