use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Txid};

use crate::balance::{ChannelBalance, Htlc, PaymentHash};
use crate::channel::{Channel, ChannelId, ChannelSetup, NodeId};
use crate::config::EngineConfig;
use crate::graph::{GraphChannel, NodeInfo, ShortChannelId};
use crate::prelude::*;
use crate::registry::Registry;
use crate::services::EngineServices;
use crate::util::loopback::{LoopbackChain, LoopbackPeer};
use crate::Arc;

/// Deterministic node id, `n` must be nonzero
pub fn make_node_id(n: u8) -> NodeId {
    let secp = Secp256k1::signing_only();
    let secret = SecretKey::from_slice(&[n; 32]).expect("valid secret");
    PublicKey::from_secret_key(&secp, &secret)
}

pub fn make_channel_id(n: u8) -> ChannelId {
    ChannelId::new([n; 32])
}

pub fn make_txid(n: u8) -> Txid {
    Txid::from_byte_array([n; 32])
}

pub fn make_funding_outpoint(n: u8, vout: u32) -> OutPoint {
    OutPoint { txid: make_txid(n), vout }
}

/// An outbound channel with no push and no reserves
pub fn make_setup(n: u8, channel_value_sat: u64) -> ChannelSetup {
    ChannelSetup {
        is_outbound: true,
        channel_value_sat,
        push_value_msat: 0,
        funding_outpoint: make_funding_outpoint(n, 0),
        local_reserve_msat: 0,
        remote_reserve_msat: 0,
        counterparty_selected_contest_delay: 144,
    }
}

/// A commitment transaction spending the funding output
pub fn make_commitment_tx(setup: &ChannelSetup) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn { previous_output: setup.funding_outpoint, ..Default::default() }],
        output: vec![TxOut {
            value: Amount::from_sat(setup.channel_value_sat),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

pub fn make_htlc(id: u64, amount_msat: u64) -> Htlc {
    Htlc {
        id,
        amount_msat,
        cltv_expiry: 500_000,
        payment_hash: PaymentHash([id as u8; 32]),
        in_holder_commitment: false,
        in_counterparty_commitment: false,
    }
}

pub struct ChannelBuilder {
    n: u8,
    setup: ChannelSetup,
    local_msat: Option<u64>,
    open: bool,
    config: EngineConfig,
}

impl ChannelBuilder {
    /// Channel `n` with a 1000 sat capacity, all ours
    pub fn new(n: u8) -> Self {
        ChannelBuilder {
            n,
            setup: make_setup(n, 1_000),
            local_msat: None,
            open: false,
            config: EngineConfig::default(),
        }
    }

    pub fn capacity_sat(mut self, channel_value_sat: u64) -> Self {
        self.setup.channel_value_sat = channel_value_sat;
        self
    }

    pub fn local_msat(mut self, local_msat: u64) -> Self {
        self.local_msat = Some(local_msat);
        self
    }

    pub fn reserves(mut self, local_msat: u64, remote_msat: u64) -> Self {
        self.setup.local_reserve_msat = local_msat;
        self.setup.remote_reserve_msat = remote_msat;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Confirm the funding before handing out the channel
    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn build(self) -> Channel {
        let mut setup = self.setup;
        if let Some(local_msat) = self.local_msat {
            setup.push_value_msat = setup.capacity_msat() - local_msat;
        }
        let mut chan = Channel::new(
            make_channel_id(self.n),
            make_node_id(self.n),
            setup,
            make_commitment_tx(&setup),
            &self.config,
        )
        .expect("new channel");
        if self.open {
            let funding = setup.funding_outpoint.txid;
            assert!(chan.on_confirmation_depth(&funding, self.config.funding_depth).unwrap());
        }
        chan
    }
}

pub fn make_node_info(n: u8, timestamp: u32) -> NodeInfo {
    let mut info = NodeInfo::new(make_node_id(n), timestamp);
    info.alias = format!("node-{}", n);
    info
}

pub fn make_graph_channel(scid: u64, a: u8, b: u8, timestamp: u32) -> GraphChannel {
    GraphChannel::new(ShortChannelId(scid), make_node_id(a), make_node_id(b), timestamp)
}

/// A registry on the current tokio runtime, with loopback services
pub fn make_registry(
    config: EngineConfig,
) -> (Arc<Registry>, Arc<LoopbackChain>, Arc<LoopbackPeer>) {
    let chain = Arc::new(LoopbackChain::new());
    let peer = Arc::new(LoopbackPeer::new());
    let services = EngineServices { chain: chain.clone(), peer: peer.clone() };
    let registry = Registry::new(config, services, tokio::runtime::Handle::current());
    (Arc::new(registry), chain, peer)
}

pub struct ChannelBalanceBuilder {
    inner: ChannelBalance,
}

impl ChannelBalanceBuilder {
    pub fn new() -> ChannelBalanceBuilder {
        ChannelBalanceBuilder { inner: ChannelBalance::zero() }
    }

    pub fn claimable(mut self, claimable: u64) -> ChannelBalanceBuilder {
        self.inner.claimable = claimable;
        self
    }

    pub fn received_htlc(mut self, received_htlc: u64) -> ChannelBalanceBuilder {
        self.inner.received_htlc = received_htlc;
        self
    }

    pub fn offered_htlc(mut self, offered_htlc: u64) -> ChannelBalanceBuilder {
        self.inner.offered_htlc = offered_htlc;
        self
    }

    pub fn sweeping(mut self, sweeping: u64) -> ChannelBalanceBuilder {
        self.inner.sweeping = sweeping;
        self
    }

    pub fn unconfirmed_count(mut self, count: u32) -> ChannelBalanceBuilder {
        self.inner.unconfirmed_count = count;
        self
    }

    pub fn channel_count(mut self, count: u32) -> ChannelBalanceBuilder {
        self.inner.channel_count = count;
        self
    }

    pub fn closing_count(mut self, count: u32) -> ChannelBalanceBuilder {
        self.inner.closing_count = count;
        self
    }

    pub fn closed_count(mut self, count: u32) -> ChannelBalanceBuilder {
        self.inner.closed_count = count;
        self
    }

    pub fn error_count(mut self, count: u32) -> ChannelBalanceBuilder {
        self.inner.error_count = count;
        self
    }

    pub fn received_htlc_count(mut self, count: u32) -> ChannelBalanceBuilder {
        self.inner.received_htlc_count = count;
        self
    }

    pub fn offered_htlc_count(mut self, count: u32) -> ChannelBalanceBuilder {
        self.inner.offered_htlc_count = count;
        self
    }

    pub fn build(self) -> ChannelBalance {
        self.inner
    }
}
