// ── Ticket domain types ──

use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

/// Listing status as reported by the server.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TicketStatus {
    Available,
    SoldOut,
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Local mirror of one ticket listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    pub id: EntityId,
    pub price: Option<f64>,
    pub available: Option<u32>,
    pub status: TicketStatus,
    /// Direction of the most recent price change, if any.
    pub last_movement: Option<PriceMovement>,
}

impl TicketSnapshot {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            price: None,
            available: None,
            status: TicketStatus::Unknown,
            last_movement: None,
        }
    }

    pub fn availability_level(&self) -> Option<AvailabilityLevel> {
        self.available.map(AvailabilityLevel::from_count)
    }
}

/// Which way a price moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PriceMovement {
    Dropped,
    Increased,
    Unchanged,
}

impl PriceMovement {
    pub fn between(old: f64, new: f64) -> Self {
        match new.partial_cmp(&old) {
            Some(std::cmp::Ordering::Less) => Self::Dropped,
            Some(std::cmp::Ordering::Greater) => Self::Increased,
            _ => Self::Unchanged,
        }
    }

    /// Verb used in activity messages ("Price dropped: ...").
    pub fn verb(self) -> &'static str {
        match self {
            Self::Dropped => "dropped",
            Self::Increased => "increased",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Coarse bucket for remaining inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AvailabilityLevel {
    SoldOut,
    /// 1 to 5 left.
    Critical,
    /// 6 to 20 left.
    Low,
    Plenty,
}

impl AvailabilityLevel {
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => Self::SoldOut,
            1..=5 => Self::Critical,
            6..=20 => Self::Low,
            _ => Self::Plenty,
        }
    }
}
