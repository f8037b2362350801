use core::fmt;

use serde_derive::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::error::ChannelError;
use crate::invariant_err;
use crate::prelude::*;

/// One side of a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// Us
    Local,
    /// The counterparty
    Remote,
}

impl Side {
    /// The opposite side
    pub fn other(self) -> Side {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Local => write!(f, "LOCAL"),
            Side::Remote => write!(f, "REMOTE"),
        }
    }
}

/// Which commitment transaction an HTLC is present on.
///
/// The two commitments are updated at different moments of the
/// commitment dance, so they can briefly disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentView {
    /// Our commitment transaction
    Holder,
    /// The counterparty's commitment transaction
    Counterparty,
}

/// Direction of an HTLC from our point of view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcDirection {
    /// We offered it (outgoing payment)
    Offered,
    /// The counterparty offered it (incoming payment)
    Received,
}

impl HtlcDirection {
    /// The direction of an HTLC offered by `offerer`
    pub fn offered_by(offerer: Side) -> Self {
        match offerer {
            Side::Local => HtlcDirection::Offered,
            Side::Remote => HtlcDirection::Received,
        }
    }
}

/// Payment hash
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentHash(#[serde_as(as = "Hex")] pub [u8; 32]);

impl fmt::Debug for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A pending HTLC, provisionally committed but not yet resolved
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Htlc {
    /// Identifier, unique among the HTLCs offered by one side
    pub id: u64,
    /// Amount
    pub amount_msat: u64,
    /// Absolute block height after which the offerer can time out
    pub cltv_expiry: u32,
    /// Payment hash
    pub payment_hash: PaymentHash,
    /// Present on our commitment
    #[serde(default)]
    pub in_holder_commitment: bool,
    /// Present on the counterparty's commitment
    #[serde(default)]
    pub in_counterparty_commitment: bool,
}

impl Htlc {
    /// Whether the HTLC is present on the given commitment view
    pub fn in_view(&self, view: CommitmentView) -> bool {
        match view {
            CommitmentView::Holder => self.in_holder_commitment,
            CommitmentView::Counterparty => self.in_counterparty_commitment,
        }
    }

    pub(crate) fn set_in_view(&mut self, view: CommitmentView) {
        match view {
            CommitmentView::Holder => self.in_holder_commitment = true,
            CommitmentView::Counterparty => self.in_counterparty_commitment = true,
        }
    }

    /// Whether the HTLC is present on at least one commitment view
    pub fn is_pending(&self) -> bool {
        self.in_holder_commitment || self.in_counterparty_commitment
    }
}

/// One side's ledger.
///
/// `balance_msat` is the settled amount attributed to the side.  HTLCs the
/// side offered remain part of its balance until they are settled (then they
/// move to the other side) or failed (then they stay).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Settled balance, including the side's own unresolved offered HTLCs
    pub balance_msat: u64,
    /// Amount the side must keep unspendable
    pub reserve_msat: u64,
    /// HTLCs offered by this side, by id
    pub offered: OrderedMap<u64, Htlc>,
}

impl Ledger {
    /// Create a ledger with no pending HTLCs
    pub fn new(balance_msat: u64, reserve_msat: u64) -> Self {
        Ledger { balance_msat, reserve_msat, offered: OrderedMap::new() }
    }

    /// Sum of offered HTLCs present on any commitment view
    pub fn pending_msat(&self) -> u64 {
        self.offered.values().filter(|h| h.is_pending()).map(|h| h.amount_msat).sum()
    }

    /// Sum of offered HTLCs present on a specific commitment view
    pub fn pending_in_view_msat(&self, view: CommitmentView) -> u64 {
        self.offered.values().filter(|h| h.in_view(view)).map(|h| h.amount_msat).sum()
    }

    /// Number of offered HTLCs present on any commitment view
    pub fn pending_count(&self) -> usize {
        self.offered.values().filter(|h| h.is_pending()).count()
    }

    /// The amount of this side's commitment output: the balance without the
    /// HTLCs it has in flight.
    pub fn committed_msat(&self) -> u64 {
        self.balance_msat.saturating_sub(self.pending_msat())
    }
}

/// Spendable amount for a side: balance minus reserve minus its outgoing
/// HTLCs in flight on either view, floored at zero.
pub fn available_to_spend(ledger: &Ledger) -> u64 {
    ledger.balance_msat.saturating_sub(ledger.reserve_msat).saturating_sub(ledger.pending_msat())
}

/// Spendable amount for a side, considering only HTLCs present on one
/// commitment view.
pub fn available_to_spend_in_view(ledger: &Ledger, view: CommitmentView) -> u64 {
    ledger
        .balance_msat
        .saturating_sub(ledger.reserve_msat)
        .saturating_sub(ledger.pending_in_view_msat(view))
}

/// Both ledgers of a channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledgers {
    /// Our ledger
    pub local: Ledger,
    /// The counterparty's ledger
    pub remote: Ledger,
}

impl Ledgers {
    /// Split `capacity_msat` between the two sides
    pub fn new(
        capacity_msat: u64,
        local_msat: u64,
        local_reserve_msat: u64,
        remote_reserve_msat: u64,
    ) -> Self {
        Ledgers {
            local: Ledger::new(local_msat, local_reserve_msat),
            remote: Ledger::new(capacity_msat.saturating_sub(local_msat), remote_reserve_msat),
        }
    }

    /// The ledger of one side
    pub fn side(&self, side: Side) -> &Ledger {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    /// The mutable ledger of one side
    pub fn side_mut(&mut self, side: Side) -> &mut Ledger {
        match side {
            Side::Local => &mut self.local,
            Side::Remote => &mut self.remote,
        }
    }

    /// Settled balance of a side
    pub fn balance(&self, side: Side) -> u64 {
        self.side(side).balance_msat
    }

    /// See [`available_to_spend`]
    pub fn available_to_spend(&self, side: Side) -> u64 {
        available_to_spend(self.side(side))
    }

    /// See [`available_to_spend_in_view`]
    pub fn available_to_spend_in_view(&self, side: Side, view: CommitmentView) -> u64 {
        available_to_spend_in_view(self.side(side), view)
    }

    /// Funds of the other side that are not available to it right now, shown
    /// from `side`'s perspective (may still resolve in `side`'s favor).
    pub fn pending_in_favor(&self, side: Side) -> u64 {
        let other = side.other();
        self.balance(other).saturating_sub(self.available_to_spend(other))
    }

    /// Sum of all pending HTLCs, both directions
    pub fn total_pending_msat(&self) -> u64 {
        self.local.pending_msat() + self.remote.pending_msat()
    }

    /// Number of pending HTLCs, both directions
    pub fn pending_htlc_count(&self) -> usize {
        self.local.pending_count() + self.remote.pending_count()
    }

    /// Check the conservation law and per-side bounds against the channel
    /// capacity.
    pub fn check_invariants(&self, capacity_msat: u64) -> Result<(), ChannelError> {
        for side in [Side::Local, Side::Remote] {
            let ledger = self.side(side);
            let pending = ledger.pending_msat();
            if pending > ledger.balance_msat {
                invariant_err!(
                    "{} pending {} exceeds balance {}",
                    side,
                    pending,
                    ledger.balance_msat
                );
            }
            if ledger.balance_msat > capacity_msat {
                invariant_err!(
                    "{} balance {} exceeds capacity {}",
                    side,
                    ledger.balance_msat,
                    capacity_msat
                );
            }
        }
        let total = self
            .local
            .committed_msat()
            .checked_add(self.remote.committed_msat())
            .and_then(|s| s.checked_add(self.total_pending_msat()));
        if total != Some(capacity_msat) {
            invariant_err!("ledger total {:?} != capacity {}", total, capacity_msat);
        }
        Ok(())
    }
}

/// Aggregate balance information, summed over channels.
///
/// Channels are counted in one of:
/// 1. unconfirmed: funding not yet deep enough
/// 2. active: open and usable
/// 3. closing: a closing transaction was broadcast
/// 4. closed / error
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelBalance {
    /// Our balance on open channels
    pub claimable: u64,
    /// Sum of htlcs offered to us
    pub received_htlc: u64,
    /// Sum of htlcs we offered
    pub offered_htlc: u64,
    /// Our balance on closing channels
    pub sweeping: u64,
    /// Current number of unconfirmed channels
    pub unconfirmed_count: u32,
    /// Current number of active channels
    pub channel_count: u32,
    /// Current number of closing channels
    pub closing_count: u32,
    /// Current number of closed channels not yet pruned
    pub closed_count: u32,
    /// Current number of channels in the error state
    pub error_count: u32,
    /// Current number of received htlcs
    pub received_htlc_count: u32,
    /// Current number of offered htlcs
    pub offered_htlc_count: u32,
}

impl ChannelBalance {
    /// Create a ChannelBalance with zero values
    pub fn zero() -> ChannelBalance {
        ChannelBalance::default()
    }

    /// Sum channel balances
    pub fn accumulate(&mut self, other: &ChannelBalance) {
        self.claimable += other.claimable;
        self.received_htlc += other.received_htlc;
        self.offered_htlc += other.offered_htlc;
        self.sweeping += other.sweeping;
        self.unconfirmed_count += other.unconfirmed_count;
        self.channel_count += other.channel_count;
        self.closing_count += other.closing_count;
        self.closed_count += other.closed_count;
        self.error_count += other.error_count;
        self.received_htlc_count += other.received_htlc_count;
        self.offered_htlc_count += other.offered_htlc_count;
    }
}
