use core::fmt;
use core::str::FromStr;

use bitcoin::secp256k1::PublicKey;
use bitcoin::{OutPoint, Transaction, Txid};
use log::{debug, error, info, warn};
use serde_derive::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::balance::{ChannelBalance, CommitmentView, Htlc, HtlcDirection, Ledgers, Side};
use crate::close::{new_attempt, CloseHandle, CloseKind, CloseStart, CloseStatus, PendingClose};
use crate::config::EngineConfig;
use crate::error::{insufficient_balance, invariant_violation, not_applicable, ChannelError};
use crate::monitor::ChannelMonitor;
use crate::prelude::*;
use crate::transition_err;
use crate::util::MSAT_PER_SAT;

/// The counterparty's node
pub type NodeId = PublicKey;

/// Opaque 32-byte channel identifier
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(#[serde_as(as = "Hex")] [u8; 32]);

impl ChannelId {
    /// Wrap raw bytes
    pub fn new(inner: [u8; 32]) -> Self {
        ChannelId(inner)
    }

    /// From a slice, which must be 32 bytes
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        Some(ChannelId(data.try_into().ok()?))
    }

    /// The raw bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// The channel id of a v1 channel: the funding txid xor'd with the output
    /// index in its last two bytes
    pub fn from_funding_outpoint(outpoint: &OutPoint) -> Self {
        use bitcoin::hashes::Hash;
        let mut res = outpoint.txid.to_byte_array();
        let index = outpoint.vout as u16;
        res[30] ^= (index >> 8) as u8;
        res[31] ^= (index & 0xff) as u8;
        ChannelId(res)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ChannelId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut res = [0u8; 32];
        hex::decode_to_slice(s, &mut res)?;
        Ok(ChannelId(res))
    }
}

/// Parameters fixed when the channel was negotiated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSetup {
    /// We funded the channel
    pub is_outbound: bool,
    /// Funding amount
    pub channel_value_sat: u64,
    /// Amount the funder gave to the other side at open
    pub push_value_msat: u64,
    /// The funding output
    pub funding_outpoint: OutPoint,
    /// Reserve we must keep
    pub local_reserve_msat: u64,
    /// Reserve the counterparty must keep
    pub remote_reserve_msat: u64,
    /// Relative timelock the counterparty imposed on our unilateral close
    pub counterparty_selected_contest_delay: u16,
}

impl ChannelSetup {
    /// Channel capacity
    pub fn capacity_msat(&self) -> u64 {
        self.channel_value_sat * MSAT_PER_SAT
    }

    /// Our balance right after funding
    pub fn initial_local_msat(&self) -> u64 {
        if self.is_outbound {
            self.capacity_msat().saturating_sub(self.push_value_msat)
        } else {
            self.push_value_msat
        }
    }
}

/// Lifecycle state of a channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Funding broadcast, waiting for confirmations
    FundingPending,
    /// Usable for payments
    Open,
    /// A negotiated closing transaction was broadcast
    ClosingCooperative {
        /// The closing transaction
        txid: Txid,
    },
    /// Our commitment transaction was published
    ClosingForce {
        /// The commitment transaction
        txid: Txid,
    },
    /// The closing transaction is buried past the safety depth
    Closed {
        /// The closing transaction
        txid: Txid,
        /// Whether the close was negotiated
        cooperative: bool,
    },
    /// Something went wrong, a unilateral close follows
    Error {
        /// What went wrong
        reason: String,
    },
}

/// The state without its data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelPhase {
    /// See [`ChannelState::FundingPending`]
    FundingPending,
    /// See [`ChannelState::Open`]
    Open,
    /// See [`ChannelState::ClosingCooperative`]
    ClosingCooperative,
    /// See [`ChannelState::ClosingForce`]
    ClosingForce,
    /// See [`ChannelState::Closed`]
    Closed,
    /// See [`ChannelState::Error`]
    Error,
}

impl ChannelState {
    /// The state without its data
    pub fn phase(&self) -> ChannelPhase {
        match self {
            ChannelState::FundingPending => ChannelPhase::FundingPending,
            ChannelState::Open => ChannelPhase::Open,
            ChannelState::ClosingCooperative { .. } => ChannelPhase::ClosingCooperative,
            ChannelState::ClosingForce { .. } => ChannelPhase::ClosingForce,
            ChannelState::Closed { .. } => ChannelPhase::Closed,
            ChannelState::Error { .. } => ChannelPhase::Error,
        }
    }

    /// Whether moving to `next` is allowed
    pub fn can_transition_to(&self, next: &ChannelState) -> bool {
        use ChannelState::*;
        match (self, next) {
            (FundingPending, Open) | (FundingPending, Error { .. }) => true,
            (Open, ClosingCooperative { .. })
            | (Open, ClosingForce { .. })
            | (Open, Error { .. }) => true,
            (ClosingCooperative { .. }, ClosingForce { .. })
            | (ClosingCooperative { .. }, Closed { cooperative: true, .. })
            | (ClosingCooperative { .. }, Error { .. }) => true,
            // a mutual close broadcast before the force close can still win
            (ClosingForce { .. }, Closed { .. }) => true,
            (Error { .. }, ClosingForce { .. }) => true,
            _ => false,
        }
    }

    /// Balances are meaningful: open, or closing with funds not yet settled
    /// on chain
    pub fn has_balances(&self) -> bool {
        matches!(
            self,
            ChannelState::Open
                | ChannelState::ClosingCooperative { .. }
                | ChannelState::ClosingForce { .. }
        )
    }
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ChannelPhase::FundingPending => "FUNDING_PENDING",
            ChannelPhase::Open => "OPEN",
            ChannelPhase::ClosingCooperative => "CLOSING_COOPERATIVE",
            ChannelPhase::ClosingForce => "CLOSING_FORCE",
            ChannelPhase::Closed => "CLOSED",
            ChannelPhase::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Balances of one side as seen in a [`ChannelInfo`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideInfo {
    /// Settled balance
    pub balance_msat: u64,
    /// Spendable right now, only while open
    pub available_msat: Option<u64>,
    /// The other side's unavailable funds, only while open
    pub pending_in_favor_msat: Option<u64>,
}

/// Point-in-time summary of a channel, for display and negotiation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel id
    pub channel_id: ChannelId,
    /// The counterparty
    pub node_id: NodeId,
    /// Current phase
    pub phase: ChannelPhase,
    /// Human readable state label
    pub state: String,
    /// Capacity
    pub capacity_msat: u64,
    /// The funding output
    pub funding_outpoint: OutPoint,
    /// Our balances, if meaningful in this state
    pub local: Option<SideInfo>,
    /// Their balances, if meaningful in this state
    pub remote: Option<SideInfo>,
    /// HTLCs we offered
    pub offered_htlc_count: usize,
    /// HTLCs offered to us
    pub received_htlc_count: usize,
    /// Blocks until a unilateral close can be swept, when force closing
    pub timelock_remaining: Option<u32>,
}

/// A payment channel with one counterparty
#[derive(Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Channel id
    pub id: ChannelId,
    /// The counterparty
    pub node_id: NodeId,
    /// Negotiated parameters
    pub setup: ChannelSetup,
    state: ChannelState,
    ledgers: Ledgers,
    holder_commitment: Transaction,
    /// On-chain observations
    pub monitor: ChannelMonitor,
    last_error: Option<String>,
    #[serde(skip)]
    pending_close: Option<PendingClose>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("state", &self.state)
            .field("ledgers", &self.ledgers)
            .field("holder_commitment", &self.holder_commitment.compute_txid())
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl Channel {
    /// Create a channel whose funding transaction was just broadcast
    pub fn new(
        id: ChannelId,
        node_id: NodeId,
        setup: ChannelSetup,
        holder_commitment: Transaction,
        config: &EngineConfig,
    ) -> Result<Channel, ChannelError> {
        let capacity_msat = setup.capacity_msat();
        if setup.push_value_msat > capacity_msat {
            return Err(insufficient_balance(format!(
                "push {} exceeds capacity {}",
                setup.push_value_msat, capacity_msat
            )));
        }
        let ledgers = Ledgers::new(
            capacity_msat,
            setup.initial_local_msat(),
            setup.local_reserve_msat,
            setup.remote_reserve_msat,
        );
        ledgers.check_invariants(capacity_msat)?;
        let monitor = ChannelMonitor::new(
            setup.funding_outpoint.txid,
            setup.counterparty_selected_contest_delay,
            config,
        );
        info!("new channel {} with {} funding {}", id, node_id, setup.funding_outpoint);
        Ok(Channel {
            id,
            node_id,
            setup,
            state: ChannelState::FundingPending,
            ledgers,
            holder_commitment,
            monitor,
            last_error: None,
            pending_close: None,
        })
    }

    /// Current state
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Current ledgers
    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    /// Channel capacity
    pub fn capacity_msat(&self) -> u64 {
        self.setup.capacity_msat()
    }

    /// Conservation and capacity bounds of the ledgers, e.g. for a channel
    /// restored from storage
    pub fn check_invariants(&self) -> Result<(), ChannelError> {
        self.ledgers
            .check_invariants(self.capacity_msat())
            .map_err(|e| e.prepend_msg(format!("channel {}: ", self.id)))
    }

    /// The transaction a unilateral close would publish
    pub fn holder_commitment(&self) -> &Transaction {
        &self.holder_commitment
    }

    /// Most recent error, kept after the channel moves on from ERROR
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a close attempt is running
    pub fn close_in_flight(&self) -> bool {
        self.pending_close.is_some()
    }

    /// Human readable state label
    pub fn get_state(&self) -> String {
        let phase = self.state.phase();
        match &self.state {
            ChannelState::ClosingCooperative { .. } | ChannelState::ClosingForce { .. } => {
                format!(
                    "{} ({}/{} conf)",
                    phase,
                    self.monitor.closing_depth(),
                    self.monitor.safety_depth
                )
            }
            ChannelState::Error { reason } => format!("{}: {}", phase, reason),
            _ => phase.to_string(),
        }
    }

    /// Move to `next`, failing if the lifecycle does not allow it
    pub fn transition(&mut self, next: ChannelState) -> Result<(), ChannelError> {
        if !self.state.can_transition_to(&next) {
            transition_err!("channel {}: {:?} -> {:?} not allowed", self.id, self.state, next);
        }
        info!("channel {}: {} -> {}", self.id, self.state.phase(), next.phase());
        self.state = next;
        trace_channel_state!(self);
        Ok(())
    }

    fn require_balances(&self) -> Result<(), ChannelError> {
        if self.state.has_balances() {
            Ok(())
        } else {
            Err(not_applicable(format!("channel {} is {}", self.id, self.state.phase())))
        }
    }

    fn require_open(&self) -> Result<(), ChannelError> {
        if self.state == ChannelState::Open {
            Ok(())
        } else {
            Err(not_applicable(format!("channel {} is {}", self.id, self.state.phase())))
        }
    }

    /// Settled balance of a side
    pub fn balance(&self, side: Side) -> Result<u64, ChannelError> {
        self.require_balances()?;
        Ok(self.ledgers.balance(side))
    }

    /// What a side can spend right now
    pub fn available_to_spend(&self, side: Side) -> Result<u64, ChannelError> {
        self.require_open()?;
        Ok(self.ledgers.available_to_spend(side))
    }

    /// What a side can spend considering only one commitment view
    pub fn available_to_spend_in_view(
        &self,
        side: Side,
        view: CommitmentView,
    ) -> Result<u64, ChannelError> {
        self.require_open()?;
        Ok(self.ledgers.available_to_spend_in_view(side, view))
    }

    /// The other side's unavailable funds, from `side`'s perspective
    pub fn pending_in_favor(&self, side: Side) -> Result<u64, ChannelError> {
        self.require_open()?;
        Ok(self.ledgers.pending_in_favor(side))
    }

    // Apply a ledger change to a copy, check it, then swap it in
    fn update_ledgers<F>(&mut self, f: F) -> Result<(), ChannelError>
    where
        F: FnOnce(&mut Ledgers) -> Result<(), ChannelError>,
    {
        let mut next = self.ledgers.clone();
        f(&mut next)?;
        next.check_invariants(self.capacity_msat())?;
        self.ledgers = next;
        trace_channel_state!(self);
        Ok(())
    }

    /// A new HTLC offered by `offerer`, appearing first on the commitment
    /// of the other side
    pub fn add_htlc(&mut self, offerer: Side, htlc: Htlc) -> Result<(), ChannelError> {
        self.require_open()?;
        if matches!(&self.pending_close, Some(p) if p.kind == CloseKind::Cooperative) {
            transition_err!("channel {} is negotiating a close", self.id);
        }
        if self.ledgers.side(offerer).offered.contains_key(&htlc.id) {
            transition_err!("channel {}: duplicate {} htlc {}", self.id, offerer, htlc.id);
        }
        let available = self.ledgers.available_to_spend(offerer);
        if htlc.amount_msat > available {
            return Err(insufficient_balance(format!(
                "channel {}: {} htlc {} of {} exceeds available {}",
                self.id, offerer, htlc.id, htlc.amount_msat, available
            )));
        }
        let mut htlc = htlc;
        htlc.in_holder_commitment = false;
        htlc.in_counterparty_commitment = false;
        htlc.set_in_view(match offerer {
            Side::Local => CommitmentView::Counterparty,
            Side::Remote => CommitmentView::Holder,
        });
        debug!("channel {}: add {:?} htlc {:?}", self.id, HtlcDirection::offered_by(offerer), htlc);
        self.update_ledgers(|l| {
            l.side_mut(offerer).offered.insert(htlc.id, htlc);
            Ok(())
        })
    }

    /// Mark an HTLC as present on another commitment view
    pub fn commit_htlc(
        &mut self,
        offerer: Side,
        id: u64,
        view: CommitmentView,
    ) -> Result<(), ChannelError> {
        self.require_open()?;
        let channel_id = self.id;
        self.update_ledgers(|l| {
            let htlc = l
                .side_mut(offerer)
                .offered
                .get_mut(&id)
                .ok_or_else(|| unknown_htlc(&channel_id, offerer, id))?;
            htlc.set_in_view(view);
            Ok(())
        })
    }

    /// The HTLC was fulfilled: its amount moves to the other side
    pub fn settle_htlc(&mut self, offerer: Side, id: u64) -> Result<(), ChannelError> {
        self.require_balances()?;
        let channel_id = self.id;
        self.update_ledgers(|l| {
            let htlc = l
                .side_mut(offerer)
                .offered
                .remove(&id)
                .ok_or_else(|| unknown_htlc(&channel_id, offerer, id))?;
            let from = l.side_mut(offerer);
            from.balance_msat = from.balance_msat.checked_sub(htlc.amount_msat).ok_or_else(|| {
                invariant_violation(format!("channel {}: settle underflow", channel_id))
            })?;
            l.side_mut(offerer.other()).balance_msat += htlc.amount_msat;
            Ok(())
        })
    }

    /// The HTLC failed or timed out: its amount stays with the offerer
    pub fn fail_htlc(&mut self, offerer: Side, id: u64) -> Result<(), ChannelError> {
        self.require_balances()?;
        let channel_id = self.id;
        self.update_ledgers(|l| {
            l.side_mut(offerer)
                .offered
                .remove(&id)
                .ok_or_else(|| unknown_htlc(&channel_id, offerer, id))?;
            Ok(())
        })
    }

    /// A new commitment transaction was signed for us
    pub fn update_holder_commitment(&mut self, tx: Transaction) -> Result<(), ChannelError> {
        self.require_open()?;
        let funding = self.setup.funding_outpoint;
        if !tx.input.iter().any(|i| i.previous_output == funding) {
            return Err(invariant_violation(format!(
                "channel {}: commitment does not spend {}",
                self.id, funding
            )));
        }
        debug!("channel {}: holder commitment now {}", self.id, tx.compute_txid());
        self.holder_commitment = tx;
        Ok(())
    }

    /// The transactions whose depth we are waiting on.  While closing this
    /// is every closing transaction broadcast, since conflicting spends of
    /// the funding output may be in flight.
    pub fn watched_txids(&self) -> Vec<Txid> {
        match &self.state {
            ChannelState::FundingPending => vec![self.monitor.funding_txid],
            ChannelState::ClosingCooperative { .. } | ChannelState::ClosingForce { .. } => {
                self.monitor.closing_txids().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Apply an observed confirmation depth.  Stale observations, for a
    /// transaction no longer watched, are ignored.  Returns whether anything
    /// visible changed.
    pub fn on_confirmation_depth(&mut self, txid: &Txid, depth: u32) -> Result<bool, ChannelError> {
        if !self.watched_txids().contains(txid) {
            debug!("channel {}: ignoring depth {} of unwatched {}", self.id, depth, txid);
            return Ok(false);
        }
        match self.state.phase() {
            ChannelPhase::FundingPending => {
                if self.monitor.on_funding_depth(depth) {
                    self.transition(ChannelState::Open)?;
                    return Ok(true);
                }
                Ok(false)
            }
            ChannelPhase::ClosingCooperative | ChannelPhase::ClosingForce => {
                let prev = self.monitor.closing_depth();
                if let Some(done) = self.monitor.on_closing_depth(txid, depth) {
                    self.transition(ChannelState::Closed {
                        txid: done.txid,
                        cooperative: done.cooperative,
                    })?;
                    return Ok(true);
                }
                Ok(prev != self.monitor.closing_depth())
            }
            _ => Ok(false),
        }
    }

    pub(crate) fn begin_cooperative_close(
        &mut self,
    ) -> Result<CloseStart<ChannelInfo>, ChannelError> {
        match &self.state {
            ChannelState::ClosingCooperative { txid } => {
                let status = CloseStatus::Broadcast(*txid);
                return Ok(CloseStart::Existing(CloseHandle::resolved(
                    self.id,
                    CloseKind::Cooperative,
                    status,
                )));
            }
            ChannelState::Open => {}
            _ => transition_err!("cannot close channel {} in {}", self.id, self.get_state()),
        }
        if let Some(pending) = &self.pending_close {
            if pending.kind == CloseKind::Cooperative {
                return Ok(CloseStart::Existing(pending.handle(self.id)));
            }
        }
        let n = self.ledgers.pending_htlc_count();
        if n > 0 {
            transition_err!("channel {} has {} pending htlcs", self.id, n);
        }
        let (reporter, handle, pending) = new_attempt(self.id, CloseKind::Cooperative);
        self.pending_close = Some(pending);
        info!("channel {}: starting cooperative close", self.id);
        Ok(CloseStart::New { reporter, handle, work: self.info() })
    }

    pub(crate) fn complete_cooperative_close(
        &mut self,
        result: Result<Txid, ChannelError>,
    ) -> Result<Txid, ChannelError> {
        if matches!(&self.pending_close, Some(p) if p.kind == CloseKind::Cooperative) {
            self.pending_close = None;
        }
        let txid = result?;
        match self.state.phase() {
            ChannelPhase::Open => {
                self.transition(ChannelState::ClosingCooperative { txid })?;
                self.monitor.on_closing_broadcast(txid, true);
            }
            ChannelPhase::Closed => {
                warn!("channel {}: cooperative close {} broadcast after close", self.id, txid);
            }
            phase => {
                // spends the same funding output as our commitment, whichever
                // confirms first closes the channel
                warn!("channel {}: cooperative close {} broadcast while {}", self.id, txid, phase);
                self.monitor.on_closing_broadcast(txid, true);
            }
        }
        Ok(txid)
    }

    pub(crate) fn begin_force_close(&mut self) -> Result<CloseStart<Transaction>, ChannelError> {
        let txid = self.holder_commitment.compute_txid();
        match self.state.phase() {
            ChannelPhase::Closed => {
                transition_err!("channel {} is already closed", self.id)
            }
            ChannelPhase::ClosingForce => {
                if let Some(pending) = &self.pending_close {
                    if pending.kind == CloseKind::Force {
                        return Ok(CloseStart::Existing(pending.handle(self.id)));
                    }
                }
                if let Some(txid) = self.monitor.force_broadcast_txid {
                    return Ok(CloseStart::Existing(CloseHandle::resolved(
                        self.id,
                        CloseKind::Force,
                        CloseStatus::Broadcast(txid),
                    )));
                }
                info!("channel {}: retrying force close broadcast", self.id);
            }
            ChannelPhase::FundingPending => {
                self.transition(ChannelState::Error {
                    reason: "force closed before funding confirmed".to_string(),
                })?;
                self.transition(ChannelState::ClosingForce { txid })?;
            }
            _ => self.transition(ChannelState::ClosingForce { txid })?,
        }
        self.monitor.on_closing_broadcast(txid, false);
        let (reporter, handle, pending) = new_attempt(self.id, CloseKind::Force);
        self.pending_close = Some(pending);
        Ok(CloseStart::New { reporter, handle, work: self.holder_commitment.clone() })
    }

    pub(crate) fn complete_force_close(
        &mut self,
        result: Result<Txid, ChannelError>,
    ) -> Result<Txid, ChannelError> {
        if matches!(&self.pending_close, Some(p) if p.kind == CloseKind::Force) {
            self.pending_close = None;
        }
        let txid = result?;
        self.monitor.on_force_broadcast(txid);
        Ok(txid)
    }

    /// Put the channel into ERROR.  Returns whether a unilateral close should
    /// follow.
    pub fn fail(&mut self, reason: &str) -> Result<bool, ChannelError> {
        self.last_error = Some(reason.to_string());
        match self.state.phase() {
            ChannelPhase::Closed => {
                warn!("channel {}: ignoring error on closed channel: {}", self.id, reason);
                Ok(false)
            }
            ChannelPhase::ClosingForce => {
                error!("channel {}: error while force closing: {}", self.id, reason);
                Ok(false)
            }
            ChannelPhase::Error => Ok(true),
            _ => {
                error!("channel {}: {}", self.id, reason);
                self.transition(ChannelState::Error { reason: reason.to_string() })?;
                Ok(true)
            }
        }
    }

    fn side_info(&self, side: Side) -> Option<SideInfo> {
        if !self.state.has_balances() {
            return None;
        }
        let open = self.state == ChannelState::Open;
        Some(SideInfo {
            balance_msat: self.ledgers.balance(side),
            available_msat: open.then(|| self.ledgers.available_to_spend(side)),
            pending_in_favor_msat: open.then(|| self.ledgers.pending_in_favor(side)),
        })
    }

    /// Point-in-time summary
    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            channel_id: self.id,
            node_id: self.node_id,
            phase: self.state.phase(),
            state: self.get_state(),
            capacity_msat: self.capacity_msat(),
            funding_outpoint: self.setup.funding_outpoint,
            local: self.side_info(Side::Local),
            remote: self.side_info(Side::Remote),
            offered_htlc_count: self.ledgers.local.pending_count(),
            received_htlc_count: self.ledgers.remote.pending_count(),
            timelock_remaining: match self.state {
                ChannelState::ClosingForce { .. } => Some(self.monitor.timelock_remaining()),
                _ => None,
            },
        }
    }

    /// This channel's contribution to the aggregate balance
    pub fn balance_summary(&self) -> ChannelBalance {
        let mut res = ChannelBalance::zero();
        match self.state.phase() {
            ChannelPhase::FundingPending => res.unconfirmed_count = 1,
            ChannelPhase::Open => {
                res.channel_count = 1;
                res.claimable = self.ledgers.local.committed_msat() / MSAT_PER_SAT;
                res.offered_htlc = self.ledgers.local.pending_msat() / MSAT_PER_SAT;
                res.received_htlc = self.ledgers.remote.pending_msat() / MSAT_PER_SAT;
                res.offered_htlc_count = self.ledgers.local.pending_count() as u32;
                res.received_htlc_count = self.ledgers.remote.pending_count() as u32;
            }
            ChannelPhase::ClosingCooperative | ChannelPhase::ClosingForce => {
                res.closing_count = 1;
                res.sweeping = self.ledgers.local.balance_msat / MSAT_PER_SAT;
            }
            ChannelPhase::Closed => res.closed_count = 1,
            ChannelPhase::Error => res.error_count = 1,
        }
        res
    }
}

fn unknown_htlc(channel_id: &ChannelId, offerer: Side, id: u64) -> ChannelError {
    crate::error::invalid_transition(format!(
        "channel {}: no {} htlc {}",
        channel_id, offerer, id
    ))
}
