//! # Optimistic Reorder
//!
//! Drag-and-drop reordering of the waiting list.
//!
//! ```text
//! IDLE -> DRAGGING -> COMMITTING -> IDLE
//!                          |
//!                          +-> ROLLED_BACK -> IDLE
//! ```
//!
//! The provisional order lives in the shared overlay, never in the store.
//! The store only changes once the backend has confirmed the move, through
//! the same delta and snapshot paths every other source uses.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use queue::{EntryId, QueueEntry, ReorderRequest};
use tracing::{debug, info, warn};

use crate::{
    api::QueueApi,
    context::ContextGuard,
    error::{ErrorClass, SyncError},
    notice::SyncNotice,
    shared::SharedQueue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Dragging,
    Committing,
    RolledBack,
}

#[derive(Debug)]
struct DragState {
    phase: DragPhase,
    provisional: Vec<EntryId>,
}

pub struct ReorderController {
    queue: Arc<SharedQueue>,
    api: Arc<dyn QueueApi>,
    state: Mutex<DragState>,
}

impl ReorderController {
    pub fn new(queue: Arc<SharedQueue>, api: Arc<dyn QueueApi>) -> Self {
        Self {
            queue,
            api,
            state: Mutex::new(DragState {
                phase: DragPhase::Idle,
                provisional: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DragState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> DragPhase {
        self.lock().phase
    }

    pub async fn visible_order(&self) -> Vec<EntryId> {
        self.queue.visible_order().await
    }

    /// Starts a drag over the current store order. Rolling back just drops
    /// the overlay, so the view falls back to that order.
    pub async fn begin_drag(&self) -> Result<(), SyncError> {
        let order = self.queue.read().await.ordered_active().to_vec();

        {
            let mut state = self.lock();
            if state.phase == DragPhase::Committing {
                return Err(SyncError::ReorderInFlight);
            }

            state.phase = DragPhase::Dragging;
            state.provisional = order.clone();
        }

        debug!("Drag started over {} entries", order.len());
        self.queue.set_overlay(Some(order)).await;

        Ok(())
    }

    /// Moves the item at `from` to `to` in the provisional order and
    /// returns the new order.
    pub async fn update_drag_position(
        &self,
        from: usize,
        to: usize,
    ) -> Result<Vec<EntryId>, SyncError> {
        let order = {
            let mut state = self.lock();
            if state.phase != DragPhase::Dragging {
                return Err(SyncError::NotDragging);
            }

            let len = state.provisional.len();
            if from >= len || to >= len {
                return Err(SyncError::InvalidDrag { from, to, len });
            }

            let moved = state.provisional.remove(from);
            state.provisional.insert(to, moved);
            state.provisional.clone()
        };

        self.queue.set_overlay(Some(order.clone())).await;
        Ok(order)
    }

    pub async fn cancel_drag(&self) -> Result<(), SyncError> {
        {
            let mut state = self.lock();
            match state.phase {
                DragPhase::Committing => return Err(SyncError::ReorderInFlight),
                DragPhase::Idle => return Ok(()),
                DragPhase::Dragging | DragPhase::RolledBack => state.phase = DragPhase::Idle,
            }
        }

        self.queue.set_overlay(None).await;
        Ok(())
    }

    /// Sends the move of `entry_id` to 1-based `new_position`. On success the
    /// store is refreshed and the overlay dropped, on failure the overlay is
    /// dropped and a [`SyncNotice::ReorderRolledBack`] goes out.
    pub async fn commit_drag(
        &self,
        guard: &ContextGuard,
        entry_id: &EntryId,
        new_position: u32,
    ) -> Result<(), SyncError> {
        let status = {
            let store = self.queue.read().await;
            let entry = store
                .get(entry_id)
                .ok_or_else(|| SyncError::UnknownEntry(entry_id.clone()))?;

            if entry.is_terminal() {
                return Err(SyncError::TerminalEntry(entry_id.clone()));
            }
            entry.status
        };

        {
            let mut state = self.lock();
            match state.phase {
                DragPhase::Dragging => {}
                DragPhase::Committing => return Err(SyncError::ReorderInFlight),
                DragPhase::Idle | DragPhase::RolledBack => return Err(SyncError::NotDragging),
            }

            let len = state.provisional.len();
            if new_position == 0 || new_position as usize > len {
                let from = state
                    .provisional
                    .iter()
                    .position(|id| id == entry_id)
                    .unwrap_or_default();
                return Err(SyncError::InvalidDrag {
                    from,
                    to: new_position as usize,
                    len,
                });
            }

            state.phase = DragPhase::Committing;
        }

        info!("Moving entry {entry_id} to position {new_position}");
        let request = ReorderRequest::single(entry_id.clone(), new_position, status);

        let echoed = match self.api.move_entry(guard.shop_id(), &request).await {
            Ok(echoed) => echoed,
            Err(err) => {
                self.roll_back(entry_id, &err).await;
                return Err(err);
            }
        };

        match self.refresh(guard, echoed).await {
            Ok(()) => {}
            Err(SyncError::StaleContext) => {
                debug!("Reorder of {entry_id} finished after a shop switch");
                self.set_phase(DragPhase::Idle);
                return Err(SyncError::StaleContext);
            }
            // The move itself went through, the next poll or push catches up.
            Err(err) => self.queue.notifier().report("Refresh after reorder", &err),
        }

        self.set_phase(DragPhase::Idle);
        self.queue.set_overlay(None).await;

        Ok(())
    }

    /// Forgets any drag. Used when the shop context changes.
    pub(crate) fn reset(&self) {
        let mut state = self.lock();

        state.phase = DragPhase::Idle;
        state.provisional.clear();
    }

    fn set_phase(&self, phase: DragPhase) {
        self.lock().phase = phase;
    }

    async fn refresh(
        &self,
        guard: &ContextGuard,
        echoed: Vec<QueueEntry>,
    ) -> Result<(), SyncError> {
        for entry in echoed {
            self.queue.apply_delta(guard, entry).await?;
        }

        let snapshot = self.api.fetch_snapshot(guard.shop_id()).await?;
        self.queue.apply_snapshot(guard, snapshot).await
    }

    async fn roll_back(&self, entry_id: &EntryId, err: &SyncError) {
        if err.class() == ErrorClass::Authorization {
            self.queue.notifier().session_expired();
        }

        warn!("Reorder of {entry_id} rolled back: {err}");
        self.set_phase(DragPhase::RolledBack);
        self.queue.set_overlay(None).await;
        self.queue.notifier().send(SyncNotice::ReorderRolledBack {
            entry_id: entry_id.clone(),
            reason: err.to_string(),
        });
        self.set_phase(DragPhase::Idle);
    }
}
