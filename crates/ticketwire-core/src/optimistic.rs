// ── Optimistic updates ──
//
// Apply a change locally before the server confirms it, then either keep
// it or roll back. A rollback restores the last confirmed value, and only
// if nothing has written to the field since the rejected change.

use serde::Serialize;

/// A value that can be changed ahead of confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimisticField<V> {
    value: V,
    /// Last value the server accepted (or the initial one).
    #[serde(skip)]
    confirmed: V,
    #[serde(skip)]
    revision: u64,
}

/// Ticket for an in-flight change, consumed by [`OptimisticField::settle`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "an optimistic change must be settled"]
pub struct Pending<V> {
    previous: V,
    applied: V,
    revision: u64,
}

impl<V> Pending<V> {
    pub fn applied(&self) -> &V {
        &self.applied
    }

    /// What the field showed before this change.
    pub fn previous(&self) -> &V {
        &self.previous
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Confirmed; the applied value stays.
    Kept,
    /// Rejected; the last confirmed value was restored.
    Reverted,
    /// Rejected, but a newer write landed in between and was left alone.
    Superseded,
}

impl<V: Clone> OptimisticField<V> {
    pub fn new(value: V) -> Self {
        Self {
            confirmed: value.clone(),
            value,
            revision: 0,
        }
    }

    pub fn get(&self) -> &V {
        &self.value
    }

    pub fn confirmed(&self) -> &V {
        &self.confirmed
    }

    /// Authoritative write (e.g. from the server). Supersedes any
    /// in-flight change.
    pub fn set(&mut self, value: V) {
        self.confirmed = value.clone();
        self.value = value;
        self.revision += 1;
    }

    /// Apply `value` now and return the ticket needed to settle it.
    pub fn begin(&mut self, value: V) -> Pending<V> {
        let previous = std::mem::replace(&mut self.value, value.clone());
        self.revision += 1;
        Pending {
            previous,
            applied: value,
            revision: self.revision,
        }
    }

    pub fn settle(&mut self, pending: Pending<V>, confirmed: bool) -> Settled {
        if confirmed {
            self.confirmed = pending.applied;
            return Settled::Kept;
        }
        if self.revision != pending.revision {
            return Settled::Superseded;
        }
        self.value = self.confirmed.clone();
        self.revision += 1;
        Settled::Reverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmed_change_sticks() {
        let mut field = OptimisticField::new("active");
        let pending = field.begin("suspended");
        assert_eq!(*field.get(), "suspended");
        assert_eq!(field.settle(pending, true), Settled::Kept);
        assert_eq!(*field.get(), "suspended");
        assert_eq!(*field.confirmed(), "suspended");
    }

    #[test]
    fn rejected_change_reverts() {
        let mut field = OptimisticField::new("active");
        let pending = field.begin("suspended");
        assert_eq!(field.settle(pending, false), Settled::Reverted);
        assert_eq!(*field.get(), "active");
    }

    #[test]
    fn newer_write_is_not_clobbered() {
        let mut field = OptimisticField::new(1);
        let first = field.begin(2);
        let second = field.begin(3);

        assert_eq!(field.settle(first, false), Settled::Superseded);
        assert_eq!(*field.get(), 3);

        // Neither change was accepted, so nothing past the baseline stays.
        assert_eq!(field.settle(second, false), Settled::Reverted);
        assert_eq!(*field.get(), 1);
    }

    #[test]
    fn rollback_stops_at_accepted_change() {
        let mut field = OptimisticField::new(1);
        let first = field.begin(2);
        let second = field.begin(3);

        assert_eq!(field.settle(first, true), Settled::Kept);
        assert_eq!(field.settle(second, false), Settled::Reverted);
        assert_eq!(*field.get(), 2);
    }

    #[test]
    fn server_write_supersedes() {
        let mut field = OptimisticField::new(1);
        let pending = field.begin(2);
        field.set(5);
        assert_eq!(field.settle(pending, false), Settled::Superseded);
        assert_eq!(*field.get(), 5);
        assert_eq!(*field.confirmed(), 5);
    }
}
