// ── Channel registry ──
//
// Reference-counted channel subscriptions. Any number of subscribers can
// share a channel name; the transport sees one join when the first one
// arrives and one leave when the last one goes. While the transport is
// down subscriptions are still accepted and remembered, and the channel
// is joined once the link comes up.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::dispatch::{self, DispatchOutcome, HandlerMap};
use crate::timers::Moment;
use crate::transport::Transport;

/// Identifies one subscription for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Returned by [`ChannelRegistry::subscribe`]; hand it back to
/// unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    channel: String,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

struct ChannelEntry<S> {
    subscribers: Vec<(SubscriptionId, HandlerMap<S>)>,
    joined: bool,
}

pub struct ChannelRegistry<S> {
    channels: IndexMap<String, ChannelEntry<S>>,
    next_id: u64,
}

impl<S> Default for ChannelRegistry<S> {
    fn default() -> Self {
        Self {
            channels: IndexMap::new(),
            next_id: 1,
        }
    }
}

impl<S> fmt::Debug for ChannelRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.channels
                    .iter()
                    .map(|(name, e)| (name, (e.subscribers.len(), e.joined))),
            )
            .finish()
    }
}

impl<S> ChannelRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handlers` on `channel`. The first subscriber on a channel
    /// triggers a join if the transport is up. Join failures are logged
    /// and the channel is retried on the next `on_connected`.
    pub fn subscribe<T>(
        &mut self,
        transport: &mut T,
        channel: &str,
        handlers: HandlerMap<S>,
    ) -> SubscriptionHandle
    where
        T: Transport + ?Sized,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let entry = self
            .channels
            .entry(channel.to_owned())
            .or_insert_with(|| ChannelEntry {
                subscribers: Vec::new(),
                joined: false,
            });
        let first = entry.subscribers.is_empty();
        entry.subscribers.push((id, handlers));

        if first {
            if transport.is_available() {
                entry.joined = join(transport, channel);
            } else {
                debug!(channel, "transport unavailable, join deferred");
            }
        }
        debug!(channel, %id, refs = entry.subscribers.len(), "subscribed");

        SubscriptionHandle {
            id,
            channel: channel.to_owned(),
        }
    }

    /// Drop a subscription. The last subscriber on a joined channel
    /// triggers a leave. Unknown handles are ignored; returns whether
    /// anything was removed.
    pub fn unsubscribe<T>(&mut self, transport: &mut T, handle: &SubscriptionHandle) -> bool
    where
        T: Transport + ?Sized,
    {
        let Some(entry) = self.channels.get_mut(&handle.channel) else {
            trace!(channel = %handle.channel, id = %handle.id, "unsubscribe for unknown channel");
            return false;
        };
        let Some(pos) = entry.subscribers.iter().position(|(id, _)| *id == handle.id) else {
            trace!(channel = %handle.channel, id = %handle.id, "unsubscribe for unknown handle");
            return false;
        };
        entry.subscribers.remove(pos);
        debug!(channel = %handle.channel, id = %handle.id, refs = entry.subscribers.len(), "unsubscribed");

        if entry.subscribers.is_empty() {
            let joined = entry.joined;
            self.channels.shift_remove(&handle.channel);
            if joined {
                if let Err(e) = transport.leave(&handle.channel) {
                    warn!(channel = %handle.channel, error = %e, "leave failed");
                }
            }
        }
        true
    }

    /// The transport came (back) up: join every channel not yet joined.
    /// Returns how many joins succeeded.
    pub fn on_connected<T>(&mut self, transport: &mut T) -> usize
    where
        T: Transport + ?Sized,
    {
        let mut joined = 0;
        for (channel, entry) in &mut self.channels {
            if entry.joined {
                continue;
            }
            entry.joined = join(transport, channel);
            joined += usize::from(entry.joined);
        }
        if joined > 0 {
            info!(channels = joined, "rejoined channels");
        }
        joined
    }

    /// The transport went down: the server forgot every join.
    pub fn on_disconnected(&mut self) {
        for entry in self.channels.values_mut() {
            entry.joined = false;
        }
    }

    /// Route an inbound event to the channel's subscribers.
    pub fn dispatch(
        &mut self,
        channel: &str,
        event_name: &str,
        payload: &Value,
        state: &mut S,
        now: Moment,
    ) -> DispatchOutcome {
        let Some(entry) = self.channels.get_mut(channel) else {
            trace!(channel, event = event_name, "event for channel with no subscribers");
            return DispatchOutcome::default();
        };
        dispatch::dispatch(&mut entry.subscribers, channel, event_name, payload, state, now)
    }

    /// Number of live subscriptions on `channel`.
    pub fn refcount(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |e| e.subscribers.len())
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels.get(channel).is_some_and(|e| e.joined)
    }

    /// Subscribed channel names, oldest first.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Drop every subscription, leaving joined channels. Returns the ids
    /// that were dropped.
    pub fn clear<T>(&mut self, transport: &mut T) -> Vec<SubscriptionId>
    where
        T: Transport + ?Sized,
    {
        let mut dropped = Vec::new();
        for (channel, entry) in self.channels.drain(..) {
            dropped.extend(entry.subscribers.iter().map(|(id, _)| *id));
            if entry.joined {
                if let Err(e) = transport.leave(&channel) {
                    warn!(channel = %channel, error = %e, "leave failed");
                }
            }
        }
        dropped
    }
}

fn join<T: Transport + ?Sized>(transport: &mut T, channel: &str) -> bool {
    match transport.join(channel) {
        Ok(()) => {
            debug!(channel, "joined");
            true
        }
        Err(e) => {
            warn!(channel, error = %e, "join failed");
            false
        }
    }
}
