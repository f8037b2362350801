use core::fmt::{self, Display, Formatter};
use core::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time;

use crate::registry::Registry;
use crate::Arc;

/// Result of one polling round
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Channels whose state or depth changed
    pub changed: usize,
    /// Closed channels removed
    pub pruned: usize,
}

impl Display for SyncReport {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} changed, {} pruned", self.changed, self.pruned)
    }
}

/// Periodically feeds confirmation depths from the chain into the registry
pub struct ChainFollower {
    registry: Arc<Registry>,
    update_interval: Duration,
    auto_prune: bool,
}

impl ChainFollower {
    /// Create a follower with the registry's configured interval
    pub fn new(registry: Arc<Registry>) -> Arc<ChainFollower> {
        let config = *registry.config();
        info!(
            "follower update_interval: {}ms, auto_prune: {}",
            config.follower_interval_ms, config.auto_prune
        );
        Arc::new(ChainFollower {
            registry,
            update_interval: Duration::from_millis(config.follower_interval_ms),
            auto_prune: config.auto_prune,
        })
    }

    /// Run until `shutdown` fires
    pub fn start(cf_arc: Arc<ChainFollower>, shutdown: triggered::Listener) -> JoinHandle<()> {
        info!("follower starting");
        let runtime = cf_arc.registry.runtime().clone();
        runtime.spawn(async move {
            cf_arc.run(shutdown).await;
        })
    }

    async fn run(&self, shutdown: triggered::Listener) {
        let mut interval = time::interval(self.update_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.update().await;
                    if report != SyncReport::default() {
                        info!("follower: {}", report);
                    }
                }
                _ = shutdown.clone() => {
                    info!("follower shutting down");
                    break;
                }
            }
        }
    }

    /// One polling round
    pub async fn update(&self) -> SyncReport {
        let changed = self.registry.sync_chain().await;
        let pruned = if self.auto_prune { self.registry.prune_closed().len() } else { 0 };
        debug!("follower round: {} changed, {} pruned", changed, pruned);
        SyncReport { changed, pruned }
    }
}
