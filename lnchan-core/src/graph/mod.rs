/// Public channels
pub mod channel;
/// Announced nodes
pub mod node;

pub use self::channel::{ChannelPolicy, GraphChannel, ShortChannelId};
pub use self::node::NodeInfo;

use itertools::Itertools;
use log::{debug, info};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde_derive::{Deserialize, Serialize};

use crate::channel::NodeId;
use crate::prelude::*;
use crate::sync::RwLock;
use crate::Arc;

/// Peer suggestions are drawn from this many best-connected nodes
pub const SUGGESTION_POOL_SIZE: usize = 20;

/// An immutable view of the graph
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphState {
    /// Nodes by id
    pub nodes: OrderedMap<NodeId, NodeInfo>,
    /// Channels by short channel id
    pub channels: OrderedMap<ShortChannelId, GraphChannel>,
}

impl GraphState {
    /// Number of channels each node participates in
    pub fn channel_counts(&self) -> Map<NodeId, usize> {
        let mut counts = Map::new();
        for chan in self.channels.values() {
            *counts.entry(chan.node_1).or_insert(0) += 1;
            *counts.entry(chan.node_2).or_insert(0) += 1;
        }
        counts
    }

    /// Channels of a node
    pub fn channels_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a GraphChannel> {
        self.channels.values().filter(move |c| c.connects(node))
    }
}

/// Serialized form of the graph
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// All nodes
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    /// All channels
    #[serde(default)]
    pub channels: Vec<GraphChannel>,
}

/// Store of the network's nodes and channels.
///
/// Readers get cheap snapshots.  Writers copy the state only if a snapshot
/// is still held somewhere.
pub struct ChannelGraph {
    state: RwLock<Arc<GraphState>>,
}

impl Default for ChannelGraph {
    fn default() -> Self {
        ChannelGraph::new()
    }
}

impl ChannelGraph {
    /// An empty graph
    pub fn new() -> Self {
        ChannelGraph { state: RwLock::new(Arc::new(GraphState::default())) }
    }

    /// Load from the serialized form, keeping the newest entry on duplicates
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let graph = ChannelGraph::new();
        for node in snapshot.nodes {
            graph.upsert_node(node);
        }
        for chan in snapshot.channels {
            graph.upsert_channel(chan);
        }
        graph
    }

    /// The serialized form
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let state = self.snapshot();
        GraphSnapshot {
            nodes: state.nodes.values().cloned().collect(),
            channels: state.channels.values().cloned().collect(),
        }
    }

    /// The current state.  Later updates do not affect it.
    pub fn snapshot(&self) -> Arc<GraphState> {
        Arc::clone(&self.state.read().unwrap())
    }

    fn update<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut GraphState) -> T,
    {
        let mut guard = self.state.write().unwrap();
        f(Arc::make_mut(&mut *guard))
    }

    /// Insert or replace a node.  An announcement older than the known one is
    /// ignored.  Returns whether the graph changed.
    pub fn upsert_node(&self, node: NodeInfo) -> bool {
        self.update(|state| {
            let stale =
                state.nodes.get(&node.node_id).map_or(false, |e| e.timestamp >= node.timestamp);
            if stale {
                debug!("ignoring stale announcement for {}", node.node_id);
                return false;
            }
            state.nodes.insert(node.node_id, node);
            true
        })
    }

    /// Insert or replace a channel.  An update older than the known one is
    /// ignored.  Returns whether the graph changed.
    pub fn upsert_channel(&self, chan: GraphChannel) -> bool {
        self.update(|state| {
            let stale = state
                .channels
                .get(&chan.short_channel_id)
                .map_or(false, |e| e.timestamp >= chan.timestamp);
            if stale {
                debug!("ignoring stale update for {}", chan.short_channel_id);
                return false;
            }
            state.channels.insert(chan.short_channel_id, chan);
            true
        })
    }

    /// Remove a channel, e.g. once its funding output is spent
    pub fn prune_channel(&self, scid: &ShortChannelId) -> Option<GraphChannel> {
        self.update(|state| state.channels.remove(scid))
    }

    /// Remove a node and every channel it participates in
    pub fn remove_node(&self, node_id: &NodeId) -> Option<NodeInfo> {
        self.update(|state| {
            state.channels.retain(|_, c| !c.connects(node_id));
            state.nodes.remove(node_id)
        })
    }

    /// Drop channels last updated before `cutoff`, then nodes left with no
    /// channels and no announcement since `cutoff`.  Returns the number of
    /// nodes and channels removed.
    pub fn prune_stale(&self, cutoff: u32) -> (usize, usize) {
        let (nodes, channels) = self.update(|state| {
            let before = state.channels.len();
            state.channels.retain(|_, c| c.timestamp >= cutoff);
            let channels = before - state.channels.len();
            let counts = state.channel_counts();
            let before = state.nodes.len();
            state.nodes.retain(|id, n| n.timestamp >= cutoff || counts.contains_key(id));
            (before - state.nodes.len(), channels)
        });
        if nodes + channels > 0 {
            info!("pruned {} nodes and {} channels older than {}", nodes, channels, cutoff);
        }
        (nodes, channels)
    }

    /// A node by id
    pub fn get_node(&self, node_id: &NodeId) -> Option<NodeInfo> {
        self.state.read().unwrap().nodes.get(node_id).cloned()
    }

    /// A channel by short channel id
    pub fn get_channel(&self, scid: &ShortChannelId) -> Option<GraphChannel> {
        self.state.read().unwrap().channels.get(scid).cloned()
    }

    /// Number of known nodes
    pub fn node_count(&self) -> usize {
        self.state.read().unwrap().nodes.len()
    }

    /// Number of known channels
    pub fn channel_count(&self) -> usize {
        self.state.read().unwrap().channels.len()
    }

    /// A node worth opening a channel to, never one in `exclude`.  None when
    /// the graph has no candidate.
    pub fn suggest_peer(&self, exclude: &UnorderedSet<NodeId>) -> Option<NodeId> {
        self.suggest_peer_with_rng(&mut rand::thread_rng(), exclude)
    }

    /// As [`Self::suggest_peer`], drawing from `rng`.
    ///
    /// Candidates are the best-connected known nodes, picked with a
    /// probability proportional to their channel count.
    pub fn suggest_peer_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        exclude: &UnorderedSet<NodeId>,
    ) -> Option<NodeId> {
        let state = self.snapshot();
        let counts = state.channel_counts();
        // most connected first, ties broken by id for determinism
        let candidates: Vec<(NodeId, usize)> = state
            .nodes
            .keys()
            .filter(|id| !exclude.contains(*id))
            .map(|id| (*id, counts.get(id).copied().unwrap_or(0)))
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
            .take(SUGGESTION_POOL_SIZE)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let weights = candidates.iter().map(|(_, count)| count + 1);
        let dist = WeightedIndex::new(weights).ok()?;
        let chosen = candidates[dist.sample(rng)].0;
        debug!("suggesting peer {} out of {} candidates", chosen, candidates.len());
        Some(chosen)
    }
}
