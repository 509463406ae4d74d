use crate::{client::ClientId, glob, resp};
use bytes::{Bytes, BytesMut};
use hashbrown::{HashMap, HashSet};
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::Notify;

/// The most message frames a slow subscriber may have queued; beyond this
/// the oldest frames are dropped.
pub const PENDING_LIMIT: usize = 1024;

#[derive(Debug, Default)]
struct Subscriber {
    channels: HashSet<Bytes>,
    pending: VecDeque<Bytes>,
    notify: Option<Arc<Notify>>,
}

/// The pub/sub hub: channel registry plus a pending frame queue per
/// subscriber. Publishing enqueues pre-serialised push frames; each
/// connection drains its own queue, so the hub never blocks.
#[derive(Debug, Default)]
pub struct Pubsub {
    channels: HashMap<Bytes, HashSet<ClientId>>,
    subscribers: HashMap<ClientId, Subscriber>,
}

impl Pubsub {
    /// Attach the waker a connection listens on for pending frames.
    pub fn register(&mut self, id: ClientId, notify: Arc<Notify>) {
        self.subscribers.entry(id).or_default().notify = Some(notify);
    }

    /// Subscribe `id` to a channel, idempotently. Returns the subscriber's
    /// total channel count.
    pub fn subscribe(&mut self, id: ClientId, channel: Bytes) -> usize {
        let subscriber = self.subscribers.entry(id).or_default();
        if subscriber.channels.insert(channel.clone()) {
            self.channels.entry(channel).or_default().insert(id);
        }
        subscriber.channels.len()
    }

    /// Unsubscribe `id` from a channel, idempotently. Returns the remaining
    /// channel count.
    pub fn unsubscribe(&mut self, id: ClientId, channel: &[u8]) -> usize {
        if let Some(subscriber) = self.subscribers.get_mut(&id) {
            if subscriber.channels.remove(channel) {
                if let Some(ids) = self.channels.get_mut(channel) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.channels.remove(channel);
                    }
                }
            }
            subscriber.channels.len()
        } else {
            0
        }
    }

    /// The channels `id` subscribes to, for unsubscribe-all replies.
    pub fn subscriptions(&self, id: ClientId) -> Vec<Bytes> {
        self.subscribers
            .get(&id)
            .map(|s| s.channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscription_count(&self, id: ClientId) -> usize {
        self.subscribers.get(&id).map_or(0, |s| s.channels.len())
    }

    /// Remove every trace of a closed connection.
    pub fn disconnect(&mut self, id: ClientId) {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return;
        };
        for channel in subscriber.channels {
            if let Some(ids) = self.channels.get_mut(&channel) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.channels.remove(&channel);
                }
            }
        }
    }

    /// Publish a message, enqueueing a `message` push frame to every
    /// subscriber of the channel. Returns the number of deliveries.
    pub fn publish(&mut self, channel: &Bytes, message: &Bytes) -> usize {
        let Some(ids) = self.channels.get(&channel[..]) else {
            return 0;
        };

        let mut frame = BytesMut::new();
        resp::encode_command(
            &[Bytes::from_static(b"message"), channel.clone(), message.clone()],
            &mut frame,
        );
        let frame = frame.freeze();

        let mut delivered = 0;
        for id in ids {
            let Some(subscriber) = self.subscribers.get_mut(id) else {
                continue;
            };
            subscriber.pending.push_back(frame.clone());
            while subscriber.pending.len() > PENDING_LIMIT {
                subscriber.pending.pop_front();
            }
            if let Some(notify) = &subscriber.notify {
                notify.notify_one();
            }
            delivered += 1;
        }
        delivered
    }

    /// Move every pending frame for `id` into an output buffer.
    pub fn drain(&mut self, id: ClientId, out: &mut BytesMut) {
        if let Some(subscriber) = self.subscribers.get_mut(&id) {
            for frame in subscriber.pending.drain(..) {
                out.extend_from_slice(&frame);
            }
        }
    }

    /// Active channels, optionally filtered by a glob pattern.
    pub fn channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        self.channels
            .keys()
            .filter(|channel| pattern.map_or(true, |p| glob::matches(channel, p)))
            .cloned()
            .collect()
    }

    /// Subscriber count for one channel.
    pub fn numsub(&self, channel: &[u8]) -> usize {
        self.channels.get(channel).map_or(0, HashSet::len)
    }
}
