use bitcoin::Txid;
use log::{debug, info};
use serde_derive::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// A broadcast transaction spending the funding output.  Conflicting spends
/// can coexist until one of them confirms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingCandidate {
    /// The closing transaction
    pub txid: Txid,
    /// Whether it is a negotiated close rather than our commitment
    pub cooperative: bool,
    /// Latest observed depth
    pub depth: u32,
}

/// On-chain observations for one channel.
///
/// Tracks how deep the funding and closing transactions are buried.  The
/// lifecycle decisions are made by [`crate::channel::Channel`] from these
/// numbers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMonitor {
    /// The funding transaction
    pub funding_txid: Txid,
    /// Latest observed funding depth
    pub funding_depth: u32,
    /// Funding depth at which the channel opens
    pub funding_min_depth: u32,
    /// Every closing transaction broadcast so far, oldest first
    #[serde(default)]
    pub closing_candidates: Vec<ClosingCandidate>,
    /// Closing depth at which the channel is closed for good
    pub safety_depth: u32,
    /// The unilateral close transaction, once successfully broadcast
    pub force_broadcast_txid: Option<Txid>,
    /// Relative timelock on our output of a unilateral close
    pub to_self_delay: u16,
}

impl ChannelMonitor {
    /// Create a monitor for a new funding transaction
    pub fn new(funding_txid: Txid, to_self_delay: u16, config: &EngineConfig) -> Self {
        ChannelMonitor {
            funding_txid,
            funding_depth: 0,
            funding_min_depth: config.funding_depth,
            closing_candidates: Vec::new(),
            safety_depth: config.safety_depth,
            force_broadcast_txid: None,
            to_self_delay,
        }
    }

    /// Adopt the depth thresholds of `config`, e.g. for a channel restored
    /// under a different configuration
    pub fn reconfigure(&mut self, config: &EngineConfig) {
        if self.funding_min_depth != config.funding_depth
            || self.safety_depth != config.safety_depth
        {
            debug!(
                "funding {} depths {}/{} -> {}/{}",
                self.funding_txid,
                self.funding_min_depth,
                self.safety_depth,
                config.funding_depth,
                config.safety_depth
            );
        }
        self.funding_min_depth = config.funding_depth;
        self.safety_depth = config.safety_depth;
    }

    /// Record a funding depth, returns true once deep enough to open
    pub fn on_funding_depth(&mut self, depth: u32) -> bool {
        if depth != self.funding_depth {
            debug!("funding {} depth {} -> {}", self.funding_txid, self.funding_depth, depth);
        }
        self.funding_depth = depth;
        depth >= self.funding_min_depth
    }

    /// Start watching a closing transaction, alongside any watched already
    pub fn on_closing_broadcast(&mut self, txid: Txid, cooperative: bool) {
        if self.closing_candidates.iter().any(|c| c.txid == txid) {
            return;
        }
        info!(
            "watching {} closing tx {} for funding {}",
            if cooperative { "mutual" } else { "unilateral" },
            txid,
            self.funding_txid
        );
        self.closing_candidates.push(ClosingCandidate { txid, cooperative, depth: 0 });
    }

    /// The closing transactions being watched
    pub fn closing_txids(&self) -> impl Iterator<Item = Txid> + '_ {
        self.closing_candidates.iter().map(|c| c.txid)
    }

    /// Record the depth of a closing transaction.  Returns the candidate
    /// that is now past the safety depth, if any.  Unknown txids are ignored.
    pub fn on_closing_depth(&mut self, txid: &Txid, depth: u32) -> Option<ClosingCandidate> {
        if let Some(candidate) = self.closing_candidates.iter_mut().find(|c| c.txid == *txid) {
            if depth != candidate.depth {
                debug!("closing {} depth {} -> {}", txid, candidate.depth, depth);
            }
            candidate.depth = depth;
        }
        self.confirmed_closing()
    }

    /// Record a successful broadcast of our unilateral close
    pub fn on_force_broadcast(&mut self, txid: Txid) {
        self.force_broadcast_txid = Some(txid);
    }

    /// The first closing transaction buried past the safety depth
    pub fn confirmed_closing(&self) -> Option<ClosingCandidate> {
        self.closing_candidates.iter().find(|c| c.depth >= self.safety_depth).copied()
    }

    /// Depth of the deepest closing transaction
    pub fn closing_depth(&self) -> u32 {
        self.closing_candidates.iter().map(|c| c.depth).max().unwrap_or(0)
    }

    /// Blocks until our output of a unilateral close can be swept
    pub fn timelock_remaining(&self) -> u32 {
        let depth = self
            .closing_candidates
            .iter()
            .filter(|c| !c.cooperative)
            .map(|c| c.depth)
            .max()
            .unwrap_or(0);
        (self.to_self_delay as u32).saturating_sub(depth)
    }
}
