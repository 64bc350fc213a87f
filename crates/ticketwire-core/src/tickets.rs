// ── Ticket board ──
//
// Mirrors tracked listings and applies per-ticket updates in place.
// Also owns the global availability banner raised when an event is about
// to sell out.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::model::{AvailabilityLevel, EntityId, PriceMovement, TicketSnapshot, TicketStatus};
use crate::timers::{Moment, TimerSet};

pub const DEFAULT_BANNER_TTL: Duration = Duration::from_secs(7);

/// Remaining-count threshold for the low-stock banner.
pub const LOW_STOCK_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BannerKind {
    LowStock,
    SoldOut,
}

impl BannerKind {
    /// Which banner, if any, a remaining count warrants.
    pub fn for_count(available: u32) -> Option<Self> {
        match available {
            0 => Some(Self::SoldOut),
            1..=LOW_STOCK_THRESHOLD => Some(Self::LowStock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBanner {
    pub kind: BannerKind,
    pub message: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HideBanner;

#[derive(Debug)]
pub struct TicketBoard {
    tickets: IndexMap<EntityId, TicketSnapshot>,
    banner: Option<AvailabilityBanner>,
    banner_ttl: Duration,
    timers: TimerSet<HideBanner>,
}

impl Default for TicketBoard {
    fn default() -> Self {
        Self::new(DEFAULT_BANNER_TTL)
    }
}

impl TicketBoard {
    pub fn new(banner_ttl: Duration) -> Self {
        Self {
            tickets: IndexMap::new(),
            banner: None,
            banner_ttl,
            timers: TimerSet::new(),
        }
    }

    // ── Tracking ─────────────────────────────────────────────────

    /// Start mirroring `id`. Keeps an existing snapshot.
    pub fn track(&mut self, id: EntityId) -> &TicketSnapshot {
        self.tickets
            .entry(id.clone())
            .or_insert_with(|| TicketSnapshot::new(id))
    }

    pub fn untrack(&mut self, id: &EntityId) -> Option<TicketSnapshot> {
        self.tickets.shift_remove(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<&TicketSnapshot> {
        self.tickets.get(id)
    }

    pub fn tickets(&self) -> impl Iterator<Item = &TicketSnapshot> {
        self.tickets.values()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    // ── Updates (tracked tickets only) ───────────────────────────

    pub fn apply_price(&mut self, id: &EntityId, old: f64, new: f64) -> Option<PriceMovement> {
        let ticket = self.tickets.get_mut(id)?;
        let movement = PriceMovement::between(old, new);
        ticket.price = Some(new);
        ticket.last_movement = Some(movement);
        Some(movement)
    }

    pub fn apply_availability(&mut self, id: &EntityId, available: u32) -> Option<AvailabilityLevel> {
        let ticket = self.tickets.get_mut(id)?;
        ticket.available = Some(available);
        if available == 0 {
            ticket.status = TicketStatus::SoldOut;
        }
        Some(AvailabilityLevel::from_count(available))
    }

    /// Returns the previous status.
    pub fn apply_status(&mut self, id: &EntityId, status: TicketStatus) -> Option<TicketStatus> {
        let ticket = self.tickets.get_mut(id)?;
        Some(std::mem::replace(&mut ticket.status, status))
    }

    // ── Banner ───────────────────────────────────────────────────

    /// Show the banner, replacing any current one, and (re)arm its hide.
    pub fn raise_banner(&mut self, kind: BannerKind, message: impl Into<String>, now: Moment) {
        self.banner = Some(AvailabilityBanner {
            kind,
            message: message.into(),
            visible: true,
        });
        self.timers.schedule(HideBanner, now.at + self.banner_ttl);
    }

    pub fn banner(&self) -> Option<&AvailabilityBanner> {
        self.banner.as_ref().filter(|b| b.visible)
    }

    pub fn advance(&mut self, now: Moment) -> bool {
        if self.timers.drain_due(now.at).is_empty() {
            return false;
        }
        match self.banner.as_mut() {
            Some(banner) if banner.visible => {
                banner.visible = false;
                true
            }
            _ => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn dispose(&mut self) {
        self.timers.dispose();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn untracked_tickets_are_ignored() {
        let mut board = TicketBoard::default();
        assert!(board.apply_price(&EntityId::from(1), 10.0, 8.0).is_none());
        assert!(board.is_empty());
    }

    #[test]
    fn price_and_availability_applied_in_place() {
        let mut board = TicketBoard::default();
        let id = EntityId::from(42);
        board.track(id.clone());

        assert_eq!(
            board.apply_price(&id, 100.0, 80.0),
            Some(PriceMovement::Dropped)
        );
        assert_eq!(
            board.apply_availability(&id, 4),
            Some(AvailabilityLevel::Critical)
        );

        let ticket = board.get(&id).unwrap();
        assert_eq!(ticket.price, Some(80.0));
        assert_eq!(ticket.available, Some(4));
        assert_eq!(ticket.last_movement, Some(PriceMovement::Dropped));
    }

    #[test]
    fn sold_out_count_sets_status() {
        let mut board = TicketBoard::default();
        let id = EntityId::from(1);
        board.track(id.clone());
        board.apply_status(&id, TicketStatus::Available);
        board.apply_availability(&id, 0);
        assert_eq!(board.get(&id).unwrap().status, TicketStatus::SoldOut);

        let previous = board.apply_status(&id, TicketStatus::Available);
        assert_eq!(previous, Some(TicketStatus::SoldOut));
    }

    #[test]
    fn banner_kinds() {
        assert_eq!(BannerKind::for_count(0), Some(BannerKind::SoldOut));
        assert_eq!(BannerKind::for_count(1), Some(BannerKind::LowStock));
        assert_eq!(BannerKind::for_count(10), Some(BannerKind::LowStock));
        assert_eq!(BannerKind::for_count(11), None);
    }

    #[test]
    fn banner_hides_after_ttl() {
        let t0 = Moment::now();
        let mut board = TicketBoard::default();
        board.raise_banner(BannerKind::LowStock, "Only 3 tickets left", t0);
        assert!(board.banner().is_some());

        assert!(!board.advance(t0 + Duration::from_millis(6999)));
        assert!(board.advance(t0 + DEFAULT_BANNER_TTL));
        assert!(board.banner().is_none());
    }

    #[test]
    fn new_banner_rearms_timer() {
        let t0 = Moment::now();
        let mut board = TicketBoard::default();
        board.raise_banner(BannerKind::LowStock, "first", t0);
        board.raise_banner(BannerKind::SoldOut, "second", t0 + Duration::from_secs(5));

        board.advance(t0 + DEFAULT_BANNER_TTL);
        assert_eq!(board.banner().unwrap().message, "second");
    }
}
