// ── Domain model ──
//
// Local caches of server truth. Nothing here is a system of record:
// every entity is keyed by the id the server assigned it.

pub(crate) mod de;

pub mod chat;
pub mod entity_id;
pub mod presence;
pub mod ticket;

pub use chat::{AgentInfo, ChatMessage, ChatSummary, MessageKind, MessageStatus, Sender};
pub use entity_id::EntityId;
pub use presence::{Availability, PresenceStatus, PresenceUser, Role};
pub use ticket::{AvailabilityLevel, PriceMovement, TicketSnapshot, TicketStatus};
