// Topic-keyed subscription registry and fan-out
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::message::{RequestEvent, Responder};

/// What `publish` does while a subscriber's inbox stays full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPolicy {
    /// Wait until the inbox has room. This is the only backpressure
    /// mechanism: a slow (or stopped) consumer throttles the publishers
    /// that target it, potentially forever.
    Block,
    /// Give up after the given duration, drop the event for that inbox,
    /// and count it in `BusStats::dropped`.
    Timeout(Duration),
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self::Block
    }
}

/// Per-topic delivery counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

/// Subscription registry: topic string -> ordered subscriber inboxes.
///
/// The bus owns no handlers and spawns no tasks; it only records which
/// inboxes want which topics and fans published requests out to them.
/// One bus belongs to one [`Manager`](crate::Manager) - there is no
/// process-wide instance.
pub struct Bus<M> {
    // Topic -> subscriber inboxes, in subscription order
    topics: DashMap<String, Vec<mpsc::Sender<RequestEvent<M>>>>,

    // Per-topic statistics
    stats: DashMap<String, BusStats>,

    policy: PublishPolicy,
}

impl<M> Default for Bus<M> {
    fn default() -> Self {
        Self::new(PublishPolicy::Block)
    }
}

impl<M> Bus<M> {
    pub fn new(policy: PublishPolicy) -> Self {
        Self {
            topics: DashMap::new(),
            stats: DashMap::new(),
            policy,
        }
    }

    /// Adds `sender` to `topic`'s subscriber list.
    ///
    /// Idempotent by channel identity: subscribing the same inbox to the
    /// same topic twice is a no-op. The whole check-then-insert runs under
    /// the registry's entry lock.
    pub fn subscribe(&self, topic: &str, sender: mpsc::Sender<RequestEvent<M>>) {
        let mut entry = self.topics.entry(topic.to_string()).or_default();
        if entry.iter().any(|s| s.same_channel(&sender)) {
            return;
        }
        entry.push(sender);
        let subscribers = entry.len();
        drop(entry);

        self.update_stats(topic, |stats| stats.subscribers = subscribers);
        debug!("Subscribed inbox to topic {} ({} total)", topic, subscribers);
    }

    /// Removes the matching inbox from `topic`, preserving the relative
    /// order of the remaining subscribers. Removing an unknown topic or a
    /// non-member inbox is a no-op. A topic with no subscribers left is
    /// deleted entirely.
    pub fn unsubscribe(&self, topic: &str, sender: &mpsc::Sender<RequestEvent<M>>) {
        let Some(mut entry) = self.topics.get_mut(topic) else {
            return;
        };
        let Some(pos) = entry.iter().position(|s| s.same_channel(sender)) else {
            return;
        };
        entry.remove(pos);
        let subscribers = entry.len();
        drop(entry);

        if subscribers == 0 {
            // Re-checked under the entry lock: a concurrent subscribe may
            // have repopulated the topic since the guard was released.
            self.topics.remove_if(topic, |_, subs| subs.is_empty());
        }
        self.update_stats(topic, |stats| stats.subscribers = subscribers);
        debug!(
            "Unsubscribed inbox from topic {} ({} remaining)",
            topic, subscribers
        );
    }

    /// Number of inboxes currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|e| e.len()).unwrap_or(0)
    }

    /// Get stats
    pub fn stats(&self, topic: &str) -> Option<BusStats> {
        self.stats.get(topic).map(|s| s.clone())
    }

    // Update stats helper function
    fn update_stats<F>(&self, topic: &str, f: F)
    where
        F: FnOnce(&mut BusStats),
    {
        f(self
            .stats
            .entry(topic.to_string())
            .or_default()
            .value_mut());
    }
}

impl<M: Clone> Bus<M> {
    /// Fans one request out to every inbox currently subscribed to
    /// `topic`, in subscription order.
    ///
    /// Each inbox receives its own `RequestEvent` carrying a clone of
    /// `body` and, for synchronous deliveries, a clone of the shared
    /// reply handle. With no subscribers the call is a silent no-op; the
    /// publisher cannot tell that nobody is listening.
    pub async fn publish(&self, topic: &str, body: M, reply: Option<Responder<M>>) {
        self.update_stats(topic, |stats| stats.published += 1);

        // Snapshot the subscriber list under the registry lock so fan-out
        // never observes a partially mutated topic entry, then release it
        // before the sends: a full inbox must not stall subscribers.
        let subscribers = match self.topics.get(topic) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!("No subscribers for topic {}", topic);
                return;
            }
        };

        let mut delivered = 0u64;
        let mut dropped = 0u64;
        for inbox in &subscribers {
            let event = RequestEvent {
                body: body.clone(),
                reply: reply.clone(),
            };
            match self.policy {
                PublishPolicy::Block => {
                    if inbox.send(event).await.is_ok() {
                        delivered += 1;
                    } else {
                        dropped += 1;
                        warn!("Subscriber inbox closed on topic {}", topic);
                    }
                }
                PublishPolicy::Timeout(limit) => match inbox.send_timeout(event, limit).await {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                        dropped += 1;
                        warn!("Dropped event for full inbox on topic {}", topic);
                    }
                    Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                        dropped += 1;
                        warn!("Subscriber inbox closed on topic {}", topic);
                    }
                },
            }
        }

        self.update_stats(topic, |stats| {
            stats.delivered += delivered;
            stats.dropped += dropped;
        });
    }
}
