//! # Reconciliation Store
//!
//! Authoritative in-memory mirror of one shop's queue.
//!
//! ## Requirements
//!
//! - One mapping from entry id to entry, ids unique
//! - Replacing an existing id keeps its slot in iteration order
//! - Active entries (`ARRIVED`, `CHECKED_IN`, `IN_SERVICE`) have one canonical order
//! - Snapshot, delta and appointment-list are the only mutations
//!
//! ## Implementation
//!
//! - `Vec` of slots for iteration order + `HashMap` id -> slot index
//! - Ordered active ids recomputed after every mutation: position, then check-in time, then id
//! - Snapshots are built aside and swapped in whole, readers never see half of one
//! - Terminal records are sticky: a later non-terminal copy of the same id is dropped
//! - Check-in time is immutable once known
use std::collections::HashMap;

use queue::{Appointment, EntryId, EntryStatus, QueueEntry, QueueSnapshot};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Queue,
    Appointment,
}

#[derive(Debug, Clone)]
struct Slot {
    entry: QueueEntry,
    source: Source,
}

impl Slot {
    fn is_scheduled_appointment(&self) -> bool {
        self.source == Source::Appointment && self.entry.status == EntryStatus::Scheduled
    }
}

/// What [`QueueStore::apply_delta`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Inserted,
    Replaced,
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    slots: Vec<Slot>,
    index: HashMap<EntryId, usize>,
    ordered: Vec<EntryId>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every entry. Ids missing from the snapshot leave the store.
    pub fn apply_snapshot(&mut self, snapshot: QueueSnapshot) {
        let QueueSnapshot {
            queue_items,
            appointments,
            completed_items,
        } = snapshot;

        let mut next = QueueStore::new();

        for entry in queue_items.into_iter().chain(completed_items) {
            next.upsert(self.settle(entry), Source::Queue);
        }

        for entry in appointments {
            next.upsert(self.settle(entry), Source::Appointment);
        }

        next.reorder();
        debug!(
            "Applied snapshot: {} entries, {} active",
            next.len(),
            next.ordered.len()
        );

        *self = next;
    }

    /// Merges one entry. Existing ids are replaced in place.
    pub fn apply_delta(&mut self, entry: QueueEntry) -> DeltaOutcome {
        let Reconciled::Accept(merged) = reconcile(self.get(&entry.id), entry) else {
            return DeltaOutcome::Ignored;
        };

        let source = if merged.status == EntryStatus::Scheduled {
            Source::Appointment
        } else {
            Source::Queue
        };

        let outcome = self.upsert(merged, source);
        self.reorder();

        outcome
    }

    /// Replaces the appointments that are still scheduled. An appointment
    /// that has moved on (checked in, served, cancelled) stays until a
    /// snapshot drops it, and a stale list cannot pull it back to scheduled.
    pub fn apply_appointments(&mut self, appointments: Vec<Appointment>) {
        let mut next = QueueStore::new();

        for slot in self.slots.iter().filter(|slot| !slot.is_scheduled_appointment()) {
            next.upsert(slot.entry.clone(), slot.source);
        }

        for entry in appointments {
            if next.get(&entry.id).is_some() {
                continue;
            }
            next.upsert(self.settle(entry), Source::Appointment);
        }

        next.reorder();
        *self = next;
    }

    /// Active ids sorted by position.
    pub fn ordered_active(&self) -> &[EntryId] {
        &self.ordered
    }

    pub fn ordered_active_entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.ordered.iter().filter_map(|id| self.get(id))
    }

    /// Active entries with dense 1-based ranks, unique even when the backend
    /// sent tied positions.
    pub fn ranked_active(&self) -> Vec<(u32, &QueueEntry)> {
        self.ordered_active_entries()
            .zip(1..)
            .map(|(entry, rank)| (rank, entry))
            .collect()
    }

    /// Entries with `status`, in store order.
    pub fn by_status(&self, status: EntryStatus) -> Vec<&QueueEntry> {
        self.iter().filter(|entry| entry.status == status).collect()
    }

    pub fn get(&self, id: &EntryId) -> Option<&QueueEntry> {
        self.index.get(id).map(|&slot| &self.slots[slot].entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.slots.iter().map(|slot| &slot.entry)
    }

    /// Entries that arrived through the appointments list.
    pub fn appointments(&self) -> Vec<Appointment> {
        self.slots
            .iter()
            .filter(|slot| slot.source == Source::Appointment)
            .map(|slot| slot.entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The copy of `incoming` a rebuilt store should hold.
    fn settle(&self, incoming: QueueEntry) -> QueueEntry {
        let previous = self.get(&incoming.id);

        match reconcile(previous, incoming) {
            Reconciled::Accept(entry) => entry,
            Reconciled::Keep(previous) => previous.clone(),
        }
    }

    fn upsert(&mut self, entry: QueueEntry, source: Source) -> DeltaOutcome {
        match self.index.get(&entry.id) {
            Some(&slot) => {
                self.slots[slot] = Slot { entry, source };
                DeltaOutcome::Replaced
            }
            None => {
                self.index.insert(entry.id.clone(), self.slots.len());
                self.slots.push(Slot { entry, source });
                DeltaOutcome::Inserted
            }
        }
    }

    fn reorder(&mut self) {
        let mut active: Vec<&QueueEntry> = self.iter().filter(|entry| entry.is_active()).collect();

        active.sort_by(|a, b| {
            (a.position.is_none(), a.position, a.check_in_time.is_none(), a.check_in_time, &a.id).cmp(&(
                b.position.is_none(),
                b.position,
                b.check_in_time.is_none(),
                b.check_in_time,
                &b.id,
            ))
        });

        for pair in active.windows(2) {
            if pair[0].position.is_some() && pair[0].position == pair[1].position {
                warn!(
                    "Entries {} and {} share position {:?}, ordering by check-in",
                    pair[0].id, pair[1].id, pair[0].position
                );
            }
        }

        self.ordered = active.into_iter().map(|entry| entry.id.clone()).collect();
    }
}

enum Reconciled<'a> {
    Accept(QueueEntry),
    Keep(&'a QueueEntry),
}

/// Applies the lifecycle rules an incoming copy must respect against what
/// the store already holds.
fn reconcile(previous: Option<&QueueEntry>, mut incoming: QueueEntry) -> Reconciled<'_> {
    let Some(previous) = previous else {
        return Reconciled::Accept(incoming);
    };

    if previous.is_terminal() && incoming.status != previous.status {
        warn!(
            "Ignoring {} -> {} for terminal entry {}",
            previous.status, incoming.status, previous.id
        );
        return Reconciled::Keep(previous);
    }

    if previous.check_in_time.is_some() {
        incoming.check_in_time = previous.check_in_time;
    }

    Reconciled::Accept(incoming)
}
