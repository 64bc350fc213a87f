// ── Broadcast transport seam ──
//
// The registry and hub talk to the realtime server only through this
// trait, so they can be driven by the WebSocket link in production and by
// a recording fake in tests.

use serde_json::Value;
use tracing::trace;

use ticketwire_api::{LinkHandle, WireCommand};

use crate::error::TransportError;

pub trait Transport: Send {
    /// Whether frames sent now would reach the server.
    fn is_available(&self) -> bool;

    fn join(&mut self, channel: &str) -> Result<(), TransportError>;

    fn leave(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Send a client event to the other members of `channel`. `event` is
    /// the bare name; the wire prefix is added by the transport.
    fn whisper(&mut self, channel: &str, event: &str, data: &Value) -> Result<(), TransportError>;
}

impl Transport for LinkHandle {
    fn is_available(&self) -> bool {
        self.is_connected()
    }

    fn join(&mut self, channel: &str) -> Result<(), TransportError> {
        queue(self, WireCommand::Subscribe {
            channel: channel.to_owned(),
        })
    }

    fn leave(&mut self, channel: &str) -> Result<(), TransportError> {
        queue(self, WireCommand::Unsubscribe {
            channel: channel.to_owned(),
        })
    }

    fn whisper(&mut self, channel: &str, event: &str, data: &Value) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable);
        }
        queue(self, WireCommand::Whisper {
            channel: channel.to_owned(),
            event: event.to_owned(),
            data: data.clone(),
        })
    }
}

fn queue(link: &LinkHandle, command: WireCommand) -> Result<(), TransportError> {
    link.send(command).map_err(|_| TransportError::Closed)
}

/// Transport that is never connected. Used when realtime updates are
/// switched off; every send takes the fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn is_available(&self) -> bool {
        false
    }

    fn join(&mut self, channel: &str) -> Result<(), TransportError> {
        trace!(channel, "join ignored, no transport");
        Err(TransportError::Unavailable)
    }

    fn leave(&mut self, channel: &str) -> Result<(), TransportError> {
        trace!(channel, "leave ignored, no transport");
        Err(TransportError::Unavailable)
    }

    fn whisper(&mut self, _channel: &str, _event: &str, _data: &Value) -> Result<(), TransportError> {
        Err(TransportError::Unavailable)
    }
}
