use log::trace;
use tokio::sync::broadcast;

use crate::channel::ChannelId;

/// A change notification.
///
/// Subscribers that fall behind receive `RecvError::Lagged` and should do a
/// full refresh from [`crate::registry::Registry::list_info`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A channel's state or balances changed
    ChannelUpdated(ChannelId),
    /// A channel was added or removed
    ChannelSetChanged,
}

/// Fan-out of [`ChannelEvent`]s to any number of subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    /// A new receiver, seeing events sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    /// Notify that a channel changed
    pub fn channel_updated(&self, channel_id: &ChannelId) {
        self.send(ChannelEvent::ChannelUpdated(*channel_id));
    }

    /// Notify that the channel set changed
    pub fn channel_set_changed(&self) {
        self.send(ChannelEvent::ChannelSetChanged);
    }

    fn send(&self, event: ChannelEvent) {
        // no subscribers is fine
        match self.sender.send(event) {
            Ok(n) => trace!("event delivered to {} subscribers", n),
            Err(broadcast::error::SendError(event)) => trace!("no subscribers for {:?}", event),
        }
    }
}
