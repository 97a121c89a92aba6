use tokio::sync::mpsc;

use crate::error::{BroadcasterError, Result};
use crate::events::{BroadcastEvent, Frame};
use crate::settings::ControlSettings;
use overlay_config::DisplayConfig;

/// Outbound half of a subscriber connection. The connection task owns the
/// receiving half and writes frames to the socket in order.
pub type SubscriberChannel = mpsc::UnboundedSender<Frame>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered subscriber
pub struct Subscriber {
    id: SubscriberId,
    channel: SubscriberChannel,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.channel.is_closed()
    }

    /// Queue a frame for this subscriber
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        self.channel
            .send(frame)
            .map_err(|_| BroadcasterError::ChannelClosed)
    }

    /// Send the state a newly joined subscriber needs before any live event:
    /// config snapshot, control status, then settings if any are cached
    pub fn send_catch_up(
        &self,
        config: &DisplayConfig,
        control_connected: bool,
        settings: &ControlSettings,
    ) -> Result<()> {
        self.send_frame(BroadcastEvent::Config(config.clone()).to_frame()?)?;

        self.send_frame(
            BroadcastEvent::WhisperingStatus {
                connected: control_connected,
            }
            .to_frame()?,
        )?;

        if !settings.is_empty() {
            self.send_frame(BroadcastEvent::WhisperingSettings(settings.clone()).to_frame()?)?;
        }

        Ok(())
    }
}

/// Registered subscribers in join order
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a channel that is about to join
    pub fn prepare(&mut self, channel: SubscriberChannel) -> Subscriber {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        Subscriber { id, channel }
    }

    pub fn insert(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Send `frame` to every open subscriber, dropping closed ones.
    /// Returns the number of subscribers the frame was queued for.
    pub fn send_all(&mut self, frame: &Frame) -> usize {
        let before = self.subscribers.len();
        let mut delivered = 0;

        self.subscribers.retain(|subscriber| {
            if !subscriber.is_open() {
                return false;
            }
            match subscriber.send_frame(Frame::clone(frame)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });

        let dropped = before - self.subscribers.len();
        if dropped > 0 {
            tracing::debug!(
                "Dropped {} closed subscriber(s). Remaining: {}",
                dropped,
                self.subscribers.len()
            );
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}
