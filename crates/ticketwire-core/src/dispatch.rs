//! Event dispatch.
//!
//! Routes one inbound `(event name, payload)` pair to the handlers a
//! channel's subscribers registered for it. The name is resolved to an
//! [`EventKind`] first; unknown names stop there. The payload is decoded
//! only if somebody is listening, and only once no matter how many
//! handlers run. A failing handler is logged and skipped; the rest still
//! run, in registration order.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::HandlerError;
use crate::event::{EventKind, LiveEvent};
use crate::registry::SubscriptionId;
use crate::timers::Moment;

/// What a handler gets to work with besides the event itself.
pub struct HandlerContext<'a, S> {
    pub state: &'a mut S,
    pub now: Moment,
    pub channel: &'a str,
    /// Subscription whose handler is running. Timers a handler arms on
    /// behalf of this subscription should be scoped to it.
    pub subscription: SubscriptionId,
}

pub type Handler<S> =
    Box<dyn FnMut(&mut HandlerContext<'_, S>, &LiveEvent) -> Result<(), HandlerError> + Send>;

/// Handlers for one subscription, keyed by event kind.
pub struct HandlerMap<S> {
    handlers: IndexMap<EventKind, Vec<Handler<S>>>,
}

impl<S> Default for HandlerMap<S> {
    fn default() -> Self {
        Self {
            handlers: IndexMap::new(),
        }
    }
}

impl<S> std::fmt::Debug for HandlerMap<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(k, v)| (k.as_str(), v.len())))
            .finish()
    }
}

impl<S> HandlerMap<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. Several handlers for the same kind
    /// run in the order they were added.
    #[must_use]
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: FnMut(&mut HandlerContext<'_, S>, &LiveEvent) -> Result<(), HandlerError> + Send + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.get(&kind).is_some_and(|h| !h.is_empty())
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.handlers.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }

    fn handlers_for(&mut self, kind: EventKind) -> &mut [Handler<S>] {
        match self.handlers.get_mut(&kind) {
            Some(handlers) => handlers.as_mut_slice(),
            None => &mut [],
        }
    }
}

/// Summary of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// `None` when the event name is not one the client knows.
    pub kind: Option<EventKind>,
    pub handled: usize,
    pub failed: usize,
    /// The payload did not decode; no handler ran.
    pub malformed: bool,
}

impl DispatchOutcome {
    /// Nothing ran and nothing went wrong.
    pub fn is_ignored(&self) -> bool {
        self.handled == 0 && self.failed == 0 && !self.malformed
    }
}

/// Run every handler registered for `event_name` across `subscribers`.
pub(crate) fn dispatch<S>(
    subscribers: &mut [(SubscriptionId, HandlerMap<S>)],
    channel: &str,
    event_name: &str,
    payload: &Value,
    state: &mut S,
    now: Moment,
) -> DispatchOutcome {
    let Some(kind) = EventKind::from_wire(event_name) else {
        trace!(channel, event = event_name, "ignoring unknown event");
        return DispatchOutcome::default();
    };
    let mut outcome = DispatchOutcome {
        kind: Some(kind),
        ..DispatchOutcome::default()
    };

    if !subscribers.iter().any(|(_, map)| map.handles(kind)) {
        trace!(channel, event = event_name, "no handler registered");
        return outcome;
    }

    let event = match LiveEvent::decode(kind, payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(channel, event = event_name, error = %e, "dropping malformed payload");
            outcome.malformed = true;
            return outcome;
        }
    };

    for (subscription, map) in subscribers.iter_mut() {
        for handler in map.handlers_for(kind) {
            let mut ctx = HandlerContext {
                state: &mut *state,
                now,
                channel,
                subscription: *subscription,
            };
            match (*handler)(&mut ctx, &event) {
                Ok(()) => outcome.handled += 1,
                Err(e) => {
                    warn!(
                        channel,
                        event = event_name,
                        %subscription,
                        error = %e,
                        "event handler failed"
                    );
                    outcome.failed += 1;
                }
            }
        }
    }
    outcome
}
