use bitcoin::{Transaction, Txid};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{info_span, instrument, Instrument};

use crate::balance::{ChannelBalance, CommitmentView, Htlc, Side};
use crate::channel::{Channel, ChannelId, ChannelInfo, ChannelPhase, ChannelSetup, NodeId};
use crate::close::{CloseHandle, CloseStart};
use crate::config::EngineConfig;
use crate::error::{duplicate_channel, not_found, ChannelError};
use crate::events::{ChannelEvent, EventBus};
use crate::graph::ChannelGraph;
use crate::prelude::*;
use crate::services::EngineServices;
use crate::Arc;

/// Aggregate views over the registry
pub trait RegistryMonitor {
    /// Sum of channel balances, and channel counts by phase
    fn channel_balance(&self) -> ChannelBalance;
}

/// The set of channels this node has, keyed by channel id.
///
/// Every channel sits behind its own lock, so operations on different
/// channels do not contend.  The map lock is only taken to find, add or
/// remove a channel, and is always taken before a channel lock.
pub struct Registry {
    config: EngineConfig,
    services: EngineServices,
    runtime: Handle,
    channels: Mutex<OrderedMap<ChannelId, Arc<Mutex<Channel>>>>,
    events: EventBus,
}

impl Registry {
    /// Create an empty registry.  Close attempts are spawned on `runtime`.
    pub fn new(config: EngineConfig, services: EngineServices, runtime: Handle) -> Registry {
        let config = config.sanitized();
        Registry {
            events: EventBus::new(config.event_capacity),
            config,
            services,
            runtime,
            channels: Mutex::new(OrderedMap::new()),
        }
    }

    /// The configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The runtime background work is spawned on
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Receive change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Add a channel, failing if its id is already present or its ledgers
    /// do not add up
    pub fn add(&self, channel: Channel) -> Result<Arc<Mutex<Channel>>, ChannelError> {
        let id = channel.id;
        channel.check_invariants()?;
        let mut channels = self.channels.lock().unwrap();
        if channels.contains_key(&id) {
            return Err(duplicate_channel(format!("channel {} already exists", id)));
        }
        debug_vals!(id, channel.node_id, channel.setup);
        let slot = Arc::new(Mutex::new(channel));
        channels.insert(id, Arc::clone(&slot));
        drop(channels);
        self.events.channel_set_changed();
        Ok(slot)
    }

    /// Register a new channel to `node_id` whose funding transaction was
    /// just broadcast.  The channel id is derived from the funding outpoint.
    pub fn open_channel(
        &self,
        node_id: NodeId,
        setup: ChannelSetup,
        holder_commitment: Transaction,
    ) -> Result<ChannelId, ChannelError> {
        let id = ChannelId::from_funding_outpoint(&setup.funding_outpoint);
        let channel = Channel::new(id, node_id, setup, holder_commitment, &self.config)?;
        self.add(channel)?;
        Ok(id)
    }

    /// Look up a channel
    pub fn get(&self, channel_id: &ChannelId) -> Result<Arc<Mutex<Channel>>, ChannelError> {
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| not_found(format!("channel {}", channel_id)))
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    /// Whether there are no channels
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The channels present right now.  Channels added or removed later do
    /// not show up.
    pub fn list(&self) -> impl Iterator<Item = Arc<Mutex<Channel>>> {
        let channels: Vec<_> = self.channels.lock().unwrap().values().cloned().collect();
        channels.into_iter()
    }

    /// A summary of every channel
    pub fn list_info(&self) -> Vec<ChannelInfo> {
        self.list().map(|slot| slot.lock().unwrap().info()).collect()
    }

    /// Read a channel under its lock
    pub fn read_channel<F, T>(&self, channel_id: &ChannelId, f: F) -> Result<T, ChannelError>
    where
        F: FnOnce(&Channel) -> T,
    {
        let slot = self.get(channel_id)?;
        let guard = slot.lock().unwrap();
        Ok(f(&guard))
    }

    /// Execute a function with a mutable reference to a channel.  Subscribers
    /// are notified if the function succeeds.
    pub fn with_channel<F, T>(&self, channel_id: &ChannelId, f: F) -> Result<T, ChannelError>
    where
        F: FnOnce(&mut Channel) -> Result<T, ChannelError>,
    {
        let slot = self.get(channel_id)?;
        let res = {
            let mut guard = slot.lock().unwrap();
            f(&mut guard)
        };
        if res.is_ok() {
            self.events.channel_updated(channel_id);
        }
        res
    }

    /// See [`Channel::get_state`]
    pub fn get_state(&self, channel_id: &ChannelId) -> Result<String, ChannelError> {
        self.read_channel(channel_id, |c| c.get_state())
    }

    /// See [`Channel::balance`]
    pub fn balance(&self, channel_id: &ChannelId, side: Side) -> Result<u64, ChannelError> {
        self.read_channel(channel_id, |c| c.balance(side))?
    }

    /// See [`Channel::available_to_spend`]
    pub fn available_to_spend(
        &self,
        channel_id: &ChannelId,
        side: Side,
    ) -> Result<u64, ChannelError> {
        self.read_channel(channel_id, |c| c.available_to_spend(side))?
    }

    /// See [`Channel::pending_in_favor`]
    pub fn pending_in_favor(&self, channel_id: &ChannelId, side: Side) -> Result<u64, ChannelError> {
        self.read_channel(channel_id, |c| c.pending_in_favor(side))?
    }

    /// See [`Channel::add_htlc`]
    pub fn add_htlc(
        &self,
        channel_id: &ChannelId,
        offerer: Side,
        htlc: Htlc,
    ) -> Result<(), ChannelError> {
        let id = htlc.id;
        let amount_msat = htlc.amount_msat;
        self.with_channel(channel_id, |c| c.add_htlc(offerer, htlc)).map_err(|e| {
            debug_failed_vals!(channel_id, offerer, id, amount_msat);
            e
        })
    }

    /// See [`Channel::commit_htlc`]
    pub fn commit_htlc(
        &self,
        channel_id: &ChannelId,
        offerer: Side,
        id: u64,
        view: CommitmentView,
    ) -> Result<(), ChannelError> {
        self.with_channel(channel_id, |c| c.commit_htlc(offerer, id, view))
    }

    /// See [`Channel::settle_htlc`]
    pub fn settle_htlc(
        &self,
        channel_id: &ChannelId,
        offerer: Side,
        id: u64,
    ) -> Result<(), ChannelError> {
        self.with_channel(channel_id, |c| c.settle_htlc(offerer, id))
    }

    /// See [`Channel::fail_htlc`]
    pub fn fail_htlc(&self, channel_id: &ChannelId, offerer: Side, id: u64) -> Result<(), ChannelError> {
        self.with_channel(channel_id, |c| c.fail_htlc(offerer, id))
    }

    /// See [`Channel::update_holder_commitment`]
    pub fn update_holder_commitment(
        &self,
        channel_id: &ChannelId,
        tx: Transaction,
    ) -> Result<(), ChannelError> {
        self.with_channel(channel_id, |c| c.update_holder_commitment(tx))
    }

    /// Start a cooperative close.
    ///
    /// The channel must be open with no pending HTLCs.  Negotiation and
    /// broadcast run in the background, the returned handle reports the
    /// outcome.  Asking again while an attempt runs returns a handle on the
    /// same attempt.
    pub fn close(&self, channel_id: &ChannelId) -> Result<CloseHandle, ChannelError> {
        let slot = self.get(channel_id)?;
        let start = slot.lock().unwrap().begin_cooperative_close()?;
        let (reporter, handle, info) = match start {
            CloseStart::Existing(handle) => return Ok(handle),
            CloseStart::New { reporter, handle, work } => (reporter, handle, work),
        };
        let services = self.services.clone();
        let events = self.events.clone();
        let id = *channel_id;
        let task = async move {
            let result = negotiate_and_broadcast(&services, &info).await;
            let outcome = slot.lock().unwrap().complete_cooperative_close(result);
            match &outcome {
                Ok(txid) => info!("cooperative close of {} broadcast as {}", id, txid),
                Err(e) => warn!("cooperative close of {} failed: {}", id, e),
            }
            events.channel_updated(&id);
            reporter.report(&outcome);
        };
        self.runtime.spawn(task.instrument(info_span!("close", channel = %id)));
        Ok(handle)
    }

    /// Close unilaterally by publishing our commitment transaction.
    ///
    /// The channel moves to CLOSING_FORCE before this returns, the broadcast
    /// happens in the background.  Calling again after a failed broadcast
    /// retries it.
    pub fn force_close(&self, channel_id: &ChannelId) -> Result<CloseHandle, ChannelError> {
        let slot = self.get(channel_id)?;
        let start = slot.lock().unwrap().begin_force_close()?;
        let (reporter, handle, commitment) = match start {
            CloseStart::Existing(handle) => return Ok(handle),
            CloseStart::New { reporter, handle, work } => (reporter, handle, work),
        };
        self.events.channel_updated(channel_id);
        let services = self.services.clone();
        let events = self.events.clone();
        let id = *channel_id;
        let task = async move {
            let result = services.chain.broadcast(&commitment).await.map_err(ChannelError::from);
            let outcome = slot.lock().unwrap().complete_force_close(result);
            match &outcome {
                Ok(txid) => info!("force close of {} broadcast as {}", id, txid),
                Err(e) => warn!("force close of {} failed: {}", id, e),
            }
            events.channel_updated(&id);
            reporter.report(&outcome);
        };
        self.runtime.spawn(task.instrument(info_span!("force_close", channel = %id)));
        Ok(handle)
    }

    /// Put a channel in ERROR and close it unilaterally.  Returns the handle
    /// of the close, or None if the channel is already closed or force
    /// closing.
    pub fn fail_channel(
        &self,
        channel_id: &ChannelId,
        reason: &str,
    ) -> Result<Option<CloseHandle>, ChannelError> {
        if !self.with_channel(channel_id, |c| c.fail(reason))? {
            return Ok(None);
        }
        Ok(Some(self.force_close(channel_id)?))
    }

    /// Remove a closed channel.
    ///
    /// Panics if the channel is not closed, funds may still be at stake.
    pub fn remove(&self, channel_id: &ChannelId) -> Result<(), ChannelError> {
        let mut channels = self.channels.lock().unwrap();
        let slot = channels
            .get(channel_id)
            .ok_or_else(|| not_found(format!("channel {}", channel_id)))?;
        let phase = slot.lock().unwrap().state().phase();
        if phase != ChannelPhase::Closed {
            panic!("attempt to remove channel {} in {}", channel_id, phase);
        }
        channels.remove(channel_id);
        drop(channels);
        info!("removed channel {}", channel_id);
        self.events.channel_set_changed();
        Ok(())
    }

    /// Remove every closed channel, returning their ids
    pub fn prune_closed(&self) -> Vec<ChannelId> {
        let mut channels = self.channels.lock().unwrap();
        let pruned: Vec<ChannelId> = channels
            .iter()
            .filter(|(_, slot)| slot.lock().unwrap().state().phase() == ChannelPhase::Closed)
            .map(|(id, _)| *id)
            .collect();
        for id in &pruned {
            channels.remove(id);
            info!("pruned closed channel {}", id);
        }
        drop(channels);
        if !pruned.is_empty() {
            self.events.channel_set_changed();
        }
        pruned
    }

    /// Query the chain for every transaction the channels wait on and apply
    /// the depths.  Returns the number of channels that changed.
    #[instrument(skip(self))]
    pub async fn sync_chain(&self) -> usize {
        let watched: Vec<(ChannelId, Txid)> = self
            .list()
            .flat_map(|slot| {
                let chan = slot.lock().unwrap();
                let id = chan.id;
                chan.watched_txids().into_iter().map(move |txid| (id, txid)).collect::<Vec<_>>()
            })
            .collect();
        let mut changed = 0;
        for (id, txid) in watched {
            let depth = match self.services.chain.confirmation_depth(&txid).await {
                Ok(depth) => depth,
                Err(e) => {
                    warn!("depth of {} for channel {}: {}", txid, id, e);
                    continue;
                }
            };
            let res = self.get(&id).and_then(|slot| {
                let mut chan = slot.lock().unwrap();
                chan.on_confirmation_depth(&txid, depth)
            });
            match res {
                Ok(true) => {
                    changed += 1;
                    self.events.channel_updated(&id);
                }
                Ok(false) => {}
                Err(e) => debug!("channel {} not updated: {}", id, e),
            }
        }
        changed
    }

    /// Counterparties of every channel we have
    pub fn peers(&self) -> UnorderedSet<NodeId> {
        self.list().map(|slot| slot.lock().unwrap().node_id).collect()
    }

    /// A node from `graph` worth opening a channel to, never one we already
    /// have a channel with
    pub fn suggest_peer(&self, graph: &ChannelGraph) -> Option<NodeId> {
        graph.suggest_peer(&self.peers())
    }
}

impl RegistryMonitor for Registry {
    fn channel_balance(&self) -> ChannelBalance {
        let mut sum = ChannelBalance::zero();
        for slot in self.list() {
            sum.accumulate(&slot.lock().unwrap().balance_summary());
        }
        sum
    }
}

async fn negotiate_and_broadcast(
    services: &EngineServices,
    info: &ChannelInfo,
) -> Result<Txid, ChannelError> {
    let tx = services.peer.negotiate_close(info).await?;
    let txid = services.chain.broadcast(&tx).await?;
    Ok(txid)
}
