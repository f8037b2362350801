use core::fmt;
use core::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::channel::NodeId;
use crate::prelude::*;

/// Short channel id: funding block height, transaction index in the block
/// and output index, packed into 64 bits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShortChannelId(pub u64);

impl ShortChannelId {
    /// Pack the three components
    pub fn new(block_height: u32, tx_index: u32, output_index: u16) -> Self {
        ShortChannelId(
            ((block_height as u64 & 0xff_ffff) << 40)
                | ((tx_index as u64 & 0xff_ffff) << 16)
                | output_index as u64,
        )
    }

    /// Height of the block with the funding transaction
    pub fn block_height(&self) -> u32 {
        (self.0 >> 40) as u32
    }

    /// Index of the funding transaction in its block
    pub fn tx_index(&self) -> u32 {
        ((self.0 >> 16) & 0xff_ffff) as u32
    }

    /// Funding output index
    pub fn output_index(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}x{}", self.block_height(), self.tx_index(), self.output_index())
    }
}

impl FromStr for ShortChannelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 3 {
            return Err(format!("expected BLOCKxTXxOUTPUT, got {}", s));
        }
        let block = parts[0].parse::<u32>().map_err(|e| e.to_string())?;
        let tx = parts[1].parse::<u32>().map_err(|e| e.to_string())?;
        let out = parts[2].parse::<u16>().map_err(|e| e.to_string())?;
        if block > 0xff_ffff || tx > 0xff_ffff {
            return Err(format!("component out of range in {}", s));
        }
        Ok(ShortChannelId::new(block, tx, out))
    }
}

/// Routing policy advertised by one end of a channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPolicy {
    /// Base fee
    pub fee_base_msat: u32,
    /// Proportional fee
    pub fee_proportional_millionths: u32,
    /// Blocks added to the expiry when forwarding
    pub cltv_expiry_delta: u16,
    /// Smallest HTLC forwarded
    pub htlc_minimum_msat: u64,
    /// Forwarding is disabled
    #[serde(default)]
    pub disabled: bool,
}

/// A public channel between two nodes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphChannel {
    /// Identifier
    pub short_channel_id: ShortChannelId,
    /// The lesser node id
    pub node_1: NodeId,
    /// The greater node id
    pub node_2: NodeId,
    /// Funding amount, when known
    #[serde(default)]
    pub capacity_sat: Option<u64>,
    /// Policy of node 1
    #[serde(default)]
    pub policy_1: Option<ChannelPolicy>,
    /// Policy of node 2
    #[serde(default)]
    pub policy_2: Option<ChannelPolicy>,
    /// Last update timestamp, newer replaces older
    pub timestamp: u32,
}

impl GraphChannel {
    /// A channel without policies.  The endpoints are put in canonical order.
    pub fn new(short_channel_id: ShortChannelId, a: NodeId, b: NodeId, timestamp: u32) -> Self {
        let (node_1, node_2) = if a <= b { (a, b) } else { (b, a) };
        GraphChannel {
            short_channel_id,
            node_1,
            node_2,
            capacity_sat: None,
            policy_1: None,
            policy_2: None,
            timestamp,
        }
    }

    /// Whether `node` is one of the endpoints
    pub fn connects(&self, node: &NodeId) -> bool {
        &self.node_1 == node || &self.node_2 == node
    }

    /// The endpoint opposite to `node`
    pub fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.node_1 == node {
            Some(&self.node_2)
        } else if &self.node_2 == node {
            Some(&self.node_1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::make_node_id;

    #[test]
    fn short_channel_id_test() {
        let scid = ShortChannelId::new(700_123, 1_542, 3);
        assert_eq!(scid.block_height(), 700_123);
        assert_eq!(scid.tx_index(), 1_542);
        assert_eq!(scid.output_index(), 3);
        assert_eq!(scid.to_string(), "700123x1542x3");
        assert_eq!("700123x1542x3".parse::<ShortChannelId>(), Ok(scid));
        assert!("700123x1542".parse::<ShortChannelId>().is_err());
        assert!("16777216x0x0".parse::<ShortChannelId>().is_err());
    }

    #[test]
    fn endpoints_test() {
        let (a, b, c) = (make_node_id(1), make_node_id(2), make_node_id(3));
        let chan = GraphChannel::new(ShortChannelId(1), b, a, 0);
        assert!(chan.node_1 <= chan.node_2);
        assert!(chan.connects(&a) && chan.connects(&b));
        assert!(!chan.connects(&c));
        assert_eq!(chan.other_end(&a), Some(&b));
        assert_eq!(chan.other_end(&c), None);
    }
}
