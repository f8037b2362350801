use core::fmt;

use serde_derive::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::channel::NodeId;
use crate::prelude::*;

/// A node announced on the network
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The node's public key
    pub node_id: NodeId,
    /// Self-chosen alias, may be empty
    #[serde(default)]
    pub alias: String,
    /// Advertised network addresses, `host:port`
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Feature bits
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub features: Vec<u8>,
    /// Announcement timestamp, newer replaces older
    pub timestamp: u32,
}

impl NodeInfo {
    /// A node with nothing but an id
    pub fn new(node_id: NodeId, timestamp: u32) -> Self {
        NodeInfo {
            node_id,
            alias: String::new(),
            addresses: Vec::new(),
            features: Vec::new(),
            timestamp,
        }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.alias.is_empty() {
            write!(f, "{}", self.node_id)
        } else {
            write!(f, "{} ({})", self.alias, self.node_id)
        }
    }
}
