#![crate_name = "lnchan"]

//! Lightning channel state and balance engine.
//!
//! See [`registry::Registry`] for the entry point and [`graph::ChannelGraph`]
//! for the network topology store.

#![forbid(unsafe_code)]
#![allow(bare_trait_objects)]
#![warn(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

pub use bitcoin;

/// Various utilities
#[macro_use]
pub mod util;
/// Balance accounting over the two channel ledgers
pub mod balance;
/// Channel and its lifecycle state machine
pub mod channel;
/// Cooperative and unilateral close attempts
pub mod close;
/// Engine configuration
pub mod config;
/// Error kinds
pub mod error;
/// Change notification
pub mod events;
/// Background chain synchronization
pub mod follower;
/// Known network nodes and channels
pub mod graph;
/// Per-channel on-chain observation
pub mod monitor;
/// The owning collection of channels
pub mod registry;
/// External chain and peer collaborators
pub mod services;

pub use alloc::sync::Arc;

extern crate alloc;

/// Common imports
pub mod prelude {
    pub use alloc::{boxed::Box, string::String, vec, vec::Vec};

    pub use hashbrown::HashMap as Map;
    pub use hashbrown::HashSet as UnorderedSet;

    pub use alloc::collections::BTreeMap as OrderedMap;

    pub use alloc::borrow::ToOwned;
    pub use alloc::string::ToString;

    pub use std::sync::{Mutex, MutexGuard};

    /// Convenience trait for Send + Sync
    pub trait SendSync: Send + Sync {}
}

pub use prelude::SendSync;

mod sync {
    pub use ::std::sync::RwLock;
}
