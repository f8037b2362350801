use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use tokio::runtime::Handle;

use lnchan::channel::Channel;
use lnchan::config::EngineConfig;
use lnchan::graph::{ChannelGraph, GraphSnapshot};
use lnchan::registry::Registry;
use lnchan::services::EngineServices;
use lnchan::util::loopback::{LoopbackChain, LoopbackPeer};
use lnchan::Arc;

pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Channels and graph as stored on disk
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub graph: GraphSnapshot,
}

impl Snapshot {
    /// Read a snapshot.  A missing file is an empty snapshot, as on a fresh
    /// installation.
    pub fn load(path: &Path) -> Result<Snapshot> {
        if !path.exists() {
            debug!("no snapshot at {}, starting empty", path.display());
            return Ok(Snapshot::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(
            "loaded {} channels, {} nodes, {} graph channels from {}",
            snapshot.channels.len(),
            snapshot.graph.nodes.len(),
            snapshot.graph.channels.len(),
            path.display()
        );
        Ok(snapshot)
    }

    /// Write the snapshot, replacing the file only once fully written
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("renaming to {}", path.display()))?;
        debug!("saved snapshot to {}", path.display());
        Ok(())
    }
}

/// A registry and graph loaded from a snapshot, backed by loopback chain and
/// peer services
pub struct Engine {
    pub registry: Arc<Registry>,
    pub graph: ChannelGraph,
    pub chain: Arc<LoopbackChain>,
    pub peer: Arc<LoopbackPeer>,
}

impl Engine {
    pub fn from_snapshot(snapshot: Snapshot, config: EngineConfig, runtime: Handle) -> Result<Engine> {
        let chain = Arc::new(LoopbackChain::new());
        let peer = Arc::new(LoopbackPeer::new());
        let services = EngineServices { chain: chain.clone(), peer: peer.clone() };
        let registry = Arc::new(Registry::new(config, services, runtime));
        for mut channel in snapshot.channels {
            channel.monitor.reconfigure(registry.config());
            let id = channel.id;
            registry.add(channel).with_context(|| format!("loading channel {}", id))?;
        }
        let graph = ChannelGraph::from_snapshot(snapshot.graph);
        Ok(Engine { registry, graph, chain, peer })
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            channels: self.registry.list().map(|slot| slot.lock().unwrap().clone()).collect(),
            graph: self.graph.to_snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lnchan::util::test_utils::*;

    #[tokio::test]
    async fn save_load_test() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join(SNAPSHOT_FILE);
        assert!(Snapshot::load(&path).unwrap().channels.is_empty());

        let graph = ChannelGraph::new();
        graph.upsert_node(make_node_info(7, 100));
        graph.upsert_channel(make_graph_channel(1, 7, 8, 100));
        let snapshot = Snapshot {
            channels: vec![ChannelBuilder::new(1).open().build(), ChannelBuilder::new(2).build()],
            graph: graph.to_snapshot(),
        };
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        let engine =
            Engine::from_snapshot(loaded, EngineConfig::default(), Handle::current()).unwrap();
        assert_eq!(engine.registry.len(), 2);
        assert_eq!(engine.graph.node_count(), 1);
        assert_eq!(engine.graph.channel_count(), 1);
        assert_eq!(engine.registry.get_state(&make_channel_id(1)).unwrap(), "OPEN");
        assert_eq!(engine.to_snapshot().channels.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_channel_in_snapshot_test() {
        let snapshot = Snapshot {
            channels: vec![ChannelBuilder::new(1).build(), ChannelBuilder::new(1).build()],
            graph: GraphSnapshot::default(),
        };
        assert!(Engine::from_snapshot(snapshot, EngineConfig::default(), Handle::current()).is_err());
    }

    #[tokio::test]
    async fn unbalanced_channel_in_snapshot_test() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        let snapshot = Snapshot {
            channels: vec![ChannelBuilder::new(1).capacity_sat(300).open().build()],
            graph: GraphSnapshot::default(),
        };
        let mut json = serde_json::to_value(&snapshot).unwrap();
        json["channels"][0]["ledgers"]["remote"]["balance_msat"] = serde_json::json!(900_000);
        fs::write(&path, json.to_string()).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        let err = Engine::from_snapshot(loaded, EngineConfig::default(), Handle::current())
            .err()
            .unwrap();
        let msg = format!("{:#}", err);
        assert!(msg.contains("loading channel"), "{}", msg);
        assert!(msg.contains("exceeds capacity"), "{}", msg);
    }

    #[test]
    fn bad_snapshot_test() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        fs::write(&path, "{ not json").unwrap();
        let err = Snapshot::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing"));
    }
}
