use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use thiserror::Error;

use crate::channel::ChannelInfo;
use crate::error::{broadcast_failed, counterparty_rejected, ChannelError};
use crate::prelude::*;
use crate::Arc;

/// Failure reported by the chain backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The transaction was refused (policy, conflict, malformed)
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The backend could not be reached
    #[error("chain backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported while negotiating with the counterparty
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The counterparty refused the proposal
    #[error("peer declined: {0}")]
    Declined(String),
    /// No connection to the counterparty
    #[error("peer not connected")]
    Disconnected,
}

impl From<ChainError> for ChannelError {
    fn from(e: ChainError) -> Self {
        broadcast_failed(e.to_string())
    }
}

impl From<PeerError> for ChannelError {
    fn from(e: PeerError) -> Self {
        counterparty_rejected(e.to_string())
    }
}

/// Access to the blockchain
#[async_trait]
pub trait ChainService: SendSync {
    /// Submit a transaction to the network, returning its txid
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError>;

    /// Number of confirmations of a transaction, zero if unconfirmed or
    /// unknown
    async fn confirmation_depth(&self, txid: &Txid) -> Result<u32, ChainError>;
}

/// Negotiation with a channel counterparty
#[async_trait]
pub trait PeerService: SendSync {
    /// Agree on a mutual closing transaction for the channel
    async fn negotiate_close(&self, info: &ChannelInfo) -> Result<Transaction, PeerError>;
}

/// External services the engine talks to
#[derive(Clone)]
pub struct EngineServices {
    /// The chain backend
    pub chain: Arc<dyn ChainService>,
    /// The peer messaging layer
    pub peer: Arc<dyn PeerService>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelErrorKind;

    #[test]
    fn error_conversion_test() {
        let err: ChannelError = ChainError::Rejected("txn-mempool-conflict".to_string()).into();
        assert_eq!(
            err.kind,
            ChannelErrorKind::BroadcastFailed("transaction rejected: txn-mempool-conflict".into())
        );
        let err: ChannelError = PeerError::Disconnected.into();
        assert_eq!(err.kind, ChannelErrorKind::CounterpartyRejected("peer not connected".into()));
        assert!(err.is_retryable());
    }
}
