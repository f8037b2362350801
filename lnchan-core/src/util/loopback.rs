use core::time::Duration;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Txid};
use log::{debug, info, warn};

use crate::channel::{ChannelInfo, ChannelSetup};
use crate::prelude::*;
use crate::services::{ChainError, ChainService, PeerError, PeerService};
use crate::util::MSAT_PER_SAT;

#[derive(Default)]
struct ChainState {
    height: u32,
    mempool: Vec<Txid>,
    // txid -> height of the including block
    confirmed: Map<Txid, u32>,
    // outpoint -> the confirmed transaction spending it
    spent: Map<OutPoint, Txid>,
    broadcasts: Vec<Transaction>,
    reject: Option<String>,
    unavailable: bool,
    funded: u32,
}

/// An in-memory chain.  Broadcast transactions wait in a mempool until
/// blocks are mined.  Conflicting spends are all accepted into the mempool,
/// only the first one broadcast gets mined.
#[derive(Default)]
pub struct LoopbackChain {
    state: Mutex<ChainState>,
}

impl SendSync for LoopbackChain {}

impl LoopbackChain {
    /// An empty chain at height zero
    pub fn new() -> Self {
        LoopbackChain::default()
    }

    /// Current tip height
    pub fn height(&self) -> u32 {
        self.state.lock().unwrap().height
    }

    /// Reject every broadcast with `reason`, or stop rejecting
    pub fn set_reject(&self, reason: Option<&str>) {
        self.state.lock().unwrap().reject = reason.map(|s| s.to_string());
    }

    /// Fail every call as if the backend were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Every transaction accepted so far
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    /// Put a txid in the mempool without a transaction, e.g. a funding
    /// transaction broadcast elsewhere
    pub fn add_to_mempool(&self, txid: Txid) {
        let mut state = self.state.lock().unwrap();
        if !state.confirmed.contains_key(&txid) && !state.mempool.contains(&txid) {
            state.mempool.push(txid);
        }
    }

    /// A funding transaction paying `value_sat` to output 0, distinct on
    /// every call.  Not broadcast.
    pub fn fund(&self, value_sat: u64) -> Transaction {
        let mut state = self.state.lock().unwrap();
        state.funded += 1;
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::from_consensus(state.funded),
            input: vec![TxIn::default()],
            output: vec![TxOut { value: Amount::from_sat(value_sat), script_pubkey: ScriptBuf::new() }],
        }
    }

    /// Whether a txid is waiting in the mempool
    pub fn in_mempool(&self, txid: &Txid) -> bool {
        self.state.lock().unwrap().mempool.contains(txid)
    }

    /// Mine `n` blocks.  The first one includes the whole mempool.
    pub fn mine_blocks(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let height = state.height + 1;
        let mempool = core::mem::take(&mut state.mempool);
        for txid in mempool {
            let inputs: Vec<OutPoint> = state
                .broadcasts
                .iter()
                .find(|tx| tx.compute_txid() == txid)
                .map(|tx| tx.input.iter().map(|i| i.previous_output).collect())
                .unwrap_or_default();
            if let Some(winner) = inputs.iter().find_map(|o| state.spent.get(o)) {
                warn!("dropping {} which conflicts with {}", txid, winner);
                continue;
            }
            for outpoint in inputs {
                state.spent.insert(outpoint, txid);
            }
            state.confirmed.insert(txid, height);
        }
        state.height += n;
        debug!("mined to height {}", state.height);
    }

    fn depth(state: &ChainState, txid: &Txid) -> u32 {
        match state.confirmed.get(txid) {
            Some(h) => state.height - h + 1,
            None => 0,
        }
    }
}

#[async_trait]
impl ChainService for LoopbackChain {
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        let txid = tx.compute_txid();
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(ChainError::Unavailable("loopback chain is down".to_string()));
        }
        if let Some(reason) = &state.reject {
            return Err(ChainError::Rejected(reason.clone()));
        }
        // already known is not an error
        if state.confirmed.contains_key(&txid) || state.mempool.contains(&txid) {
            return Ok(txid);
        }
        info!("broadcast {}", txid);
        state.mempool.push(txid);
        if !state.broadcasts.iter().any(|t| t.compute_txid() == txid) {
            state.broadcasts.push(tx.clone());
        }
        Ok(txid)
    }

    async fn confirmation_depth(&self, txid: &Txid) -> Result<u32, ChainError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(ChainError::Unavailable("loopback chain is down".to_string()));
        }
        Ok(Self::depth(&state, txid))
    }
}

#[derive(Default)]
struct PeerState {
    reject: Option<String>,
    disconnected: bool,
    negotiations: usize,
    delay: Option<Duration>,
}

/// A counterparty that agrees to any close splitting the channel by the
/// current balances
#[derive(Default)]
pub struct LoopbackPeer {
    state: Mutex<PeerState>,
}

impl SendSync for LoopbackPeer {}

impl LoopbackPeer {
    /// A cooperative peer
    pub fn new() -> Self {
        LoopbackPeer::default()
    }

    /// Decline every close with `reason`, or stop declining
    pub fn set_reject(&self, reason: Option<&str>) {
        self.state.lock().unwrap().reject = reason.map(|s| s.to_string());
    }

    /// Simulate a lost connection
    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().unwrap().disconnected = disconnected;
    }

    /// Take this long to answer
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Number of negotiations started
    pub fn negotiations(&self) -> usize {
        self.state.lock().unwrap().negotiations
    }
}

/// The first commitment transaction of a new channel, paying each side its
/// initial balance
pub fn initial_commitment_tx(setup: &ChannelSetup) -> Transaction {
    let local = setup.initial_local_msat() / MSAT_PER_SAT;
    let remote = setup.channel_value_sat.saturating_sub(local);
    let output = [local, remote]
        .into_iter()
        .filter(|v| *v > 0)
        .map(|v| TxOut { value: Amount::from_sat(v), script_pubkey: ScriptBuf::new() })
        .collect();
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn { previous_output: setup.funding_outpoint, ..Default::default() }],
        output,
    }
}

/// The mutual close transaction paying each side its balance
pub fn mutual_close_tx(info: &ChannelInfo) -> Option<Transaction> {
    let local = info.local?.balance_msat / MSAT_PER_SAT;
    let remote = info.remote?.balance_msat / MSAT_PER_SAT;
    let output = [local, remote]
        .into_iter()
        .filter(|v| *v > 0)
        .map(|v| TxOut { value: Amount::from_sat(v), script_pubkey: ScriptBuf::new() })
        .collect();
    Some(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn { previous_output: info.funding_outpoint, ..Default::default() }],
        output,
    })
}

#[async_trait]
impl PeerService for LoopbackPeer {
    async fn negotiate_close(&self, info: &ChannelInfo) -> Result<Transaction, PeerError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.negotiations += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let state = self.state.lock().unwrap();
            if state.disconnected {
                return Err(PeerError::Disconnected);
            }
            if let Some(reason) = &state.reject {
                return Err(PeerError::Declined(reason.clone()));
            }
        }
        mutual_close_tx(info)
            .ok_or_else(|| PeerError::Declined(format!("channel is {}", info.phase)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::*;

    #[tokio::test]
    async fn chain_depth_test() {
        let chain = LoopbackChain::new();
        let setup = make_setup(1, 1_000);
        let tx = make_commitment_tx(&setup);
        let txid = chain.broadcast(&tx).await.unwrap();
        assert_eq!(txid, tx.compute_txid());
        assert!(chain.in_mempool(&txid));
        assert_eq!(chain.confirmation_depth(&txid).await, Ok(0));
        chain.mine_blocks(1);
        assert_eq!(chain.confirmation_depth(&txid).await, Ok(1));
        chain.mine_blocks(5);
        assert_eq!(chain.confirmation_depth(&txid).await, Ok(6));
        // rebroadcast is idempotent
        assert_eq!(chain.broadcast(&tx).await, Ok(txid));
        assert_eq!(chain.broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn conflicting_spends_test() {
        let chain = LoopbackChain::new();
        let setup = make_setup(1, 1_000);
        let first = make_commitment_tx(&setup);
        let mut second = first.clone();
        second.lock_time = LockTime::from_consensus(1);
        let first_txid = chain.broadcast(&first).await.unwrap();
        let second_txid = chain.broadcast(&second).await.unwrap();
        assert!(chain.in_mempool(&second_txid));
        chain.mine_blocks(3);
        assert_eq!(chain.confirmation_depth(&first_txid).await, Ok(3));
        assert_eq!(chain.confirmation_depth(&second_txid).await, Ok(0));
        assert!(!chain.in_mempool(&second_txid));
        // a later conflicting broadcast never confirms either
        assert_eq!(chain.broadcast(&second).await, Ok(second_txid));
        chain.mine_blocks(1);
        assert_eq!(chain.confirmation_depth(&second_txid).await, Ok(0));
    }

    #[tokio::test]
    async fn fund_test() {
        let chain = LoopbackChain::new();
        let a = chain.fund(1_000);
        let b = chain.fund(1_000);
        assert_ne!(a.compute_txid(), b.compute_txid());
        assert_eq!(a.output[0].value.to_sat(), 1_000);
        assert!(chain.broadcasts().is_empty());

        let setup = ChannelSetup {
            funding_outpoint: bitcoin::OutPoint { txid: a.compute_txid(), vout: 0 },
            push_value_msat: 250_500,
            ..make_setup(1, 1_000)
        };
        let commitment = initial_commitment_tx(&setup);
        assert_eq!(commitment.input[0].previous_output, setup.funding_outpoint);
        let values: Vec<u64> = commitment.output.iter().map(|o| o.value.to_sat()).collect();
        assert_eq!(values, vec![749, 251]);
    }

    #[tokio::test]
    async fn chain_failures_test() {
        let chain = LoopbackChain::new();
        let tx = make_commitment_tx(&make_setup(1, 1_000));
        chain.set_reject(Some("min relay fee not met"));
        assert_eq!(
            chain.broadcast(&tx).await,
            Err(ChainError::Rejected("min relay fee not met".to_string()))
        );
        chain.set_reject(None);
        chain.set_unavailable(true);
        assert!(matches!(
            chain.confirmation_depth(&tx.compute_txid()).await,
            Err(ChainError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn peer_test() {
        let peer = LoopbackPeer::new();
        let chan = ChannelBuilder::new(1).capacity_sat(300).local_msat(200_000).open().build();
        let tx = peer.negotiate_close(&chan.info()).await.unwrap();
        assert_eq!(tx.input[0].previous_output, chan.setup.funding_outpoint);
        let values: Vec<u64> = tx.output.iter().map(|o| o.value.to_sat()).collect();
        assert_eq!(values, vec![200, 100]);
        peer.set_reject(Some("fee"));
        assert_eq!(
            peer.negotiate_close(&chan.info()).await,
            Err(PeerError::Declined("fee".to_string()))
        );
        peer.set_disconnected(true);
        assert_eq!(peer.negotiate_close(&chan.info()).await, Err(PeerError::Disconnected));
        assert_eq!(peer.negotiations(), 3);

        let pending = ChannelBuilder::new(2).build();
        peer.set_disconnected(false);
        peer.set_reject(None);
        assert!(peer.negotiate_close(&pending.info()).await.is_err());
    }
}
