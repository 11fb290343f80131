use std::collections::HashSet;

use queue::{Appointment, EntryId, EntryStatus, QueueEntry};

use crate::store::QueueStore;

/// The three display buckets of the queue page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueView {
    pub waiting: Vec<QueueEntry>,
    pub appointments: Vec<Appointment>,
    pub completed: Vec<QueueEntry>,
    /// Set while `waiting` follows an unconfirmed drag order.
    pub provisional: bool,
}

impl QueueView {
    pub fn waiting_ids(&self) -> Vec<EntryId> {
        self.waiting.iter().map(|entry| entry.id.clone()).collect()
    }
}

pub fn project(store: &QueueStore) -> QueueView {
    project_with_order(store, None)
}

/// Projects the store, letting `order` override the waiting order. Ids in
/// `order` that left the store are skipped, active ids it does not know are
/// appended in store order.
pub fn project_with_order(store: &QueueStore, order: Option<&[EntryId]>) -> QueueView {
    let authoritative = store.ordered_active();
    let ordered: Vec<&EntryId> = match order {
        Some(order) => {
            let known: HashSet<&EntryId> = order.iter().collect();
            order
                .iter()
                .chain(authoritative.iter().filter(|id| !known.contains(id)))
                .collect()
        }
        None => authoritative.iter().collect(),
    };

    let waiting = ordered
        .into_iter()
        .filter_map(|id| store.get(id))
        .filter(|entry| entry.is_active() && entry.service_end_time.is_none())
        .cloned()
        .collect();

    let mut appointments: Vec<Appointment> = store
        .by_status(EntryStatus::Scheduled)
        .into_iter()
        .cloned()
        .collect();
    appointments.sort_by_key(|entry| (entry.appointment_time.is_none(), entry.appointment_time));

    let completed = store
        .iter()
        .filter(|entry| entry.is_terminal())
        .cloned()
        .collect();

    QueueView {
        waiting,
        appointments,
        completed,
        provisional: order.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use queue::{Id, QueueSnapshot};

    use super::*;

    fn store() -> QueueStore {
        let nine = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap();
        let ten = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();

        let mut finished = QueueEntry::new(Id::Number(2), EntryStatus::InService).with_position(2);
        finished.service_end_time = Some(ten);

        let mut store = QueueStore::new();
        store.apply_snapshot(QueueSnapshot {
            queue_items: vec![
                QueueEntry::new(Id::Number(3), EntryStatus::Arrived).with_position(3),
                QueueEntry::new(Id::Number(1), EntryStatus::CheckedIn).with_position(1),
                finished,
            ],
            appointments: vec![
                QueueEntry::new(Id::from("late"), EntryStatus::Scheduled).with_appointment_time(ten),
                QueueEntry::new(Id::from("early"), EntryStatus::Scheduled).with_appointment_time(nine),
            ],
            completed_items: vec![
                QueueEntry::new(Id::Number(9), EntryStatus::Completed),
                QueueEntry::new(Id::Number(8), EntryStatus::NoShow),
            ],
        });

        store
    }

    #[test]
    fn test_buckets_are_disjoint_and_ordered() {
        let view = project(&store());

        assert_eq!(view.waiting_ids(), vec![Id::Number(1), Id::Number(3)]);
        assert_eq!(
            view.appointments.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            vec![Id::from("early"), Id::from("late")]
        );
        assert_eq!(
            view.completed.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            vec![Id::Number(9), Id::Number(8)]
        );
        assert!(!view.provisional);
    }

    #[test]
    fn test_provisional_order_overrides_waiting() {
        let store = store();
        let order = vec![Id::Number(3), Id::Number(1)];

        let view = project_with_order(&store, Some(&order));

        assert_eq!(view.waiting_ids(), vec![Id::Number(3), Id::Number(1)]);
        assert!(view.provisional);
    }

    #[test]
    fn test_provisional_order_tolerates_drift() {
        let mut store = store();
        store.apply_delta(QueueEntry::new(Id::Number(4), EntryStatus::Arrived).with_position(4));
        let order = vec![Id::Number(3), Id::Number(77), Id::Number(1)];

        let view = project_with_order(&store, Some(&order));

        assert_eq!(
            view.waiting_ids(),
            vec![Id::Number(3), Id::Number(1), Id::Number(4)]
        );
    }
}
