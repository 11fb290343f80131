use std::sync::{Mutex, PoisonError};

use queue::{Appointment, EntryId, QueueEntry, QueueSnapshot};
use tokio::sync::{RwLock, RwLockReadGuard, watch};
use tracing::debug;

use crate::{
    context::{ContextGuard, ShopContext},
    error::SyncError,
    notice::Notifier,
    projection::{QueueView, project_with_order},
    store::{DeltaOutcome, QueueStore},
};

/// Authoritative store plus the ephemeral drag overlay, shared by the event
/// pump, the poller and the reorder controller.
///
/// Every mutation checks the caller's [`ContextGuard`] first and republishes
/// the [`QueueView`] afterwards.
pub struct SharedQueue {
    store: RwLock<QueueStore>,
    overlay: Mutex<Option<Vec<EntryId>>>,
    view: watch::Sender<QueueView>,
    notifier: Notifier,
    context: ShopContext,
}

impl SharedQueue {
    pub fn new(notifier: Notifier) -> Self {
        let (view, _) = watch::channel(QueueView::default());

        Self {
            store: RwLock::new(QueueStore::new()),
            overlay: Mutex::new(None),
            view,
            notifier,
            context: ShopContext::new(),
        }
    }

    pub fn context(&self) -> &ShopContext {
        &self.context
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe_view(&self) -> watch::Receiver<QueueView> {
        self.view.subscribe()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, QueueStore> {
        self.store.read().await
    }

    /// Empties the store and drops any overlay. Used when switching shops.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;

        *store = QueueStore::new();
        *self.overlay.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.publish(&store);
    }

    pub async fn apply_snapshot(
        &self,
        guard: &ContextGuard,
        snapshot: QueueSnapshot,
    ) -> Result<(), SyncError> {
        let mut store = self.store.write().await;
        ensure_current(guard)?;

        store.apply_snapshot(snapshot);
        self.publish(&store);

        Ok(())
    }

    /// Snapshot pushed over the socket. A push without an appointments or
    /// completed list keeps what is already held for that bucket.
    pub async fn apply_pushed_snapshot(
        &self,
        guard: &ContextGuard,
        queue_items: Vec<QueueEntry>,
        appointments: Option<Vec<Appointment>>,
        completed_items: Option<Vec<QueueEntry>>,
    ) -> Result<(), SyncError> {
        let mut store = self.store.write().await;
        ensure_current(guard)?;

        let appointments = appointments.unwrap_or_else(|| store.appointments());
        let completed_items = completed_items.unwrap_or_else(|| {
            store
                .iter()
                .filter(|entry| entry.is_terminal())
                .cloned()
                .collect()
        });
        store.apply_snapshot(QueueSnapshot {
            queue_items,
            appointments,
            completed_items,
        });
        self.publish(&store);

        Ok(())
    }

    pub async fn apply_delta(
        &self,
        guard: &ContextGuard,
        entry: QueueEntry,
    ) -> Result<DeltaOutcome, SyncError> {
        let mut store = self.store.write().await;
        ensure_current(guard)?;

        let outcome = store.apply_delta(entry);
        if outcome != DeltaOutcome::Ignored {
            self.publish(&store);
        }

        Ok(outcome)
    }

    pub async fn apply_appointments(
        &self,
        guard: &ContextGuard,
        appointments: Vec<Appointment>,
    ) -> Result<(), SyncError> {
        let mut store = self.store.write().await;
        ensure_current(guard)?;

        store.apply_appointments(appointments);
        self.publish(&store);

        Ok(())
    }

    /// Sets or clears the drag overlay. Never touches the store.
    pub async fn set_overlay(&self, order: Option<Vec<EntryId>>) {
        let store = self.store.read().await;

        *self.overlay.lock().unwrap_or_else(PoisonError::into_inner) = order;
        self.publish(&store);
    }

    /// Order the user currently sees: the overlay while dragging, the store's
    /// order otherwise.
    pub async fn visible_order(&self) -> Vec<EntryId> {
        let store = self.store.read().await;
        let overlay = self.overlay.lock().unwrap_or_else(PoisonError::into_inner);

        match overlay.as_ref() {
            Some(order) => order.clone(),
            None => store.ordered_active().to_vec(),
        }
    }

    pub fn view(&self) -> QueueView {
        self.view.borrow().clone()
    }

    fn publish(&self, store: &QueueStore) {
        let overlay = self.overlay.lock().unwrap_or_else(PoisonError::into_inner);
        let view = project_with_order(store, overlay.as_deref());

        debug!(
            "Publishing view: {} waiting, {} appointments, {} completed",
            view.waiting.len(),
            view.appointments.len(),
            view.completed.len()
        );
        self.view.send_replace(view);
    }
}

fn ensure_current(guard: &ContextGuard) -> Result<(), SyncError> {
    if guard.is_current() {
        Ok(())
    } else {
        debug!("Dropping result for stale shop {}", guard.shop_id());
        Err(SyncError::StaleContext)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use queue::{EntryStatus, Id};

    use super::*;
    use crate::notice::LogSession;

    fn shared() -> SharedQueue {
        SharedQueue::new(Notifier::new(Arc::new(LogSession)))
    }

    #[tokio::test]
    async fn test_stale_guard_cannot_mutate() {
        let queue = shared();
        let old = queue.context().begin("north");
        let _new = queue.context().begin("south");

        let result = queue
            .apply_delta(&old, QueueEntry::new(Id::Number(1), EntryStatus::Arrived))
            .await;

        assert!(matches!(result, Err(SyncError::StaleContext)));
        assert!(queue.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_mutations_publish_views() {
        let queue = shared();
        let guard = queue.context().begin("north");
        let mut views = queue.subscribe_view();

        queue
            .apply_delta(
                &guard,
                QueueEntry::new(Id::Number(1), EntryStatus::Arrived).with_position(1),
            )
            .await
            .unwrap();

        assert!(views.has_changed().unwrap());
        assert_eq!(views.borrow_and_update().waiting_ids(), vec![Id::Number(1)]);
    }

    #[tokio::test]
    async fn test_pushed_snapshot_keeps_appointments() {
        let queue = shared();
        let guard = queue.context().begin("north");
        queue
            .apply_snapshot(
                &guard,
                QueueSnapshot {
                    appointments: vec![QueueEntry::new(Id::from("a1"), EntryStatus::Scheduled)],
                    ..QueueSnapshot::default()
                },
            )
            .await
            .unwrap();

        queue
            .apply_pushed_snapshot(
                &guard,
                vec![QueueEntry::new(Id::Number(1), EntryStatus::Arrived).with_position(1)],
                None,
                None,
            )
            .await
            .unwrap();

        let view = queue.view();
        assert_eq!(view.appointments.len(), 1);
        assert_eq!(view.waiting.len(), 1);
    }

    #[tokio::test]
    async fn test_overlay_does_not_touch_store() {
        let queue = shared();
        let guard = queue.context().begin("north");
        queue
            .apply_snapshot(
                &guard,
                QueueSnapshot {
                    queue_items: vec![
                        QueueEntry::new(Id::Number(1), EntryStatus::Arrived).with_position(1),
                        QueueEntry::new(Id::Number(2), EntryStatus::Arrived).with_position(2),
                    ],
                    ..QueueSnapshot::default()
                },
            )
            .await
            .unwrap();

        queue
            .set_overlay(Some(vec![Id::Number(2), Id::Number(1)]))
            .await;

        assert_eq!(queue.visible_order().await, vec![Id::Number(2), Id::Number(1)]);
        assert_eq!(
            queue.read().await.ordered_active(),
            &[Id::Number(1), Id::Number(2)]
        );
        assert!(queue.view().provisional);
    }
}
