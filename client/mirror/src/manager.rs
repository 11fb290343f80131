//! # Connection Manager
//!
//! Owns everything needed to mirror one shop: transport, poller, event pump
//! and reorder controller. There is no global instance, whoever shows the
//! queue creates one and hands it to its dependents.
//!
//! ## Lifecycle
//!
//! - [`ConnectionManager::init`] starts a new shop context, connects, starts polling and does the initial load
//! - [`ConnectionManager::teardown`] closes the socket, stops polling and invalidates the context
//! - Work started under an older context is discarded when it completes
//!
//! ## Event Pump
//!
//! - Socket turned `Open`: refetch the snapshot, pushes may have been missed
//! - `queue_update` with items: applied as a snapshot
//! - `queue_update` without items: refetch
//! - `new_entry`, `appointment_update`: applied as deltas
//! - Lagged behind the event channel: refetch
use std::sync::Arc;

use queue::{EntryId, EntryUpdate, QueueEntry, ServerMessage};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::{HttpApi, QueueApi},
    config::Config,
    context::ContextGuard,
    error::{ErrorClass, SyncError},
    notice::{Notifier, SessionHandler, SyncNotice},
    polling::{PollIntervals, Poller},
    projection::QueueView,
    reorder::ReorderController,
    shared::SharedQueue,
    transport::{ConnectionState, Connector, Transport, WsConnector},
};

pub struct ConnectionManager {
    config: Config,
    api: Arc<dyn QueueApi>,
    queue: Arc<SharedQueue>,
    transport: Transport,
    poller: Poller,
    reorder: ReorderController,
    pump: Option<JoinHandle<()>>,
    guard: Option<ContextGuard>,
}

impl ConnectionManager {
    pub fn new(config: Config, session: Arc<dyn SessionHandler>) -> Result<Self, SyncError> {
        let api = Arc::new(HttpApi::new(&config)?);

        Ok(Self::with_parts(config, api, Arc::new(WsConnector), session))
    }

    pub fn with_parts(
        config: Config,
        api: Arc<dyn QueueApi>,
        connector: Arc<dyn Connector>,
        session: Arc<dyn SessionHandler>,
    ) -> Self {
        let queue = Arc::new(SharedQueue::new(Notifier::new(session)));
        let transport = Transport::new(connector, config.ws_url(), config.reconnect_delay);
        let poller = Poller::new(queue.clone(), api.clone(), transport.state());
        let reorder = ReorderController::new(queue.clone(), api.clone());

        Self {
            config,
            api,
            queue,
            transport,
            poller,
            reorder,
            pump: None,
            guard: None,
        }
    }

    /// Switches to `shop_id`. Everything but the initial load keeps running
    /// when this returns an error, call [`Self::retry_initial_load`] to try
    /// again.
    pub async fn init(&mut self, shop_id: &str) -> Result<(), SyncError> {
        self.teardown().await;

        info!("Mirroring queue of shop {shop_id}");
        let guard = self.queue.context().begin(shop_id);
        self.queue.clear().await;

        let pump = Pump {
            queue: self.queue.clone(),
            api: self.api.clone(),
            guard: guard.clone(),
        };
        self.pump = Some(tokio::spawn(
            pump.run(self.transport.subscribe(), self.transport.state()),
        ));

        self.transport.connect(shop_id).await;
        self.poller
            .start(guard.clone(), PollIntervals::from(&self.config));
        self.guard = Some(guard);

        self.retry_initial_load().await
    }

    pub async fn retry_initial_load(&self) -> Result<(), SyncError> {
        let guard = self.current()?;

        match self.api.fetch_snapshot(guard.shop_id()).await {
            Ok(snapshot) => {
                info!(
                    "Loaded {} entries for shop {}",
                    snapshot.len(),
                    guard.shop_id()
                );
                self.queue.apply_snapshot(&guard, snapshot).await
            }
            Err(err) => {
                warn!("Initial load for shop {} failed: {err}", guard.shop_id());
                if err.class() == ErrorClass::Authorization {
                    self.queue.notifier().session_expired();
                }
                Err(err)
            }
        }
    }

    /// Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if let Some(guard) = self.guard.take() {
            info!("Releasing shop {}", guard.shop_id());
        }

        self.queue.context().invalidate();
        self.transport.disconnect().await;
        self.poller.stop();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.reorder.reset();
    }

    pub fn shop_id(&self) -> Option<&str> {
        self.guard.as_ref().map(ContextGuard::shop_id)
    }

    pub fn view(&self) -> QueueView {
        self.queue.view()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<QueueView> {
        self.queue.subscribe_view()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.queue.notifier().subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.state()
    }

    pub fn reorder(&self) -> &ReorderController {
        &self.reorder
    }

    pub async fn commit_drag(
        &self,
        entry_id: &EntryId,
        new_position: u32,
    ) -> Result<(), SyncError> {
        let guard = self.current()?;

        self.reorder.commit_drag(&guard, entry_id, new_position).await
    }

    /// Sends a partial update for one entry after checking it against the
    /// status lifecycle, then merges the backend's answer.
    pub async fn update_entry(
        &self,
        entry_id: &EntryId,
        update: EntryUpdate,
    ) -> Result<QueueEntry, SyncError> {
        let guard = self.current()?;

        {
            let store = self.queue.read().await;
            let entry = store
                .get(entry_id)
                .ok_or_else(|| SyncError::UnknownEntry(entry_id.clone()))?;

            if entry.is_terminal() && update.touches_assignment() {
                return Err(SyncError::TerminalEntry(entry_id.clone()));
            }
            if let Some(next) = update.status {
                entry.status.transition(next)?;
            }
        }

        match self.api.update_entry(guard.shop_id(), entry_id, &update).await {
            Ok(updated) => {
                self.queue.apply_delta(&guard, updated.clone()).await?;
                Ok(updated)
            }
            Err(err) => {
                self.queue.notifier().report("Entry update", &err);
                Err(err)
            }
        }
    }

    fn current(&self) -> Result<ContextGuard, SyncError> {
        match &self.guard {
            Some(guard) if guard.is_current() => Ok(guard.clone()),
            _ => Err(SyncError::StaleContext),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.queue.context().invalidate();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

struct Pump {
    queue: Arc<SharedQueue>,
    api: Arc<dyn QueueApi>,
    guard: ContextGuard,
}

impl Pump {
    async fn run(
        self,
        mut events: broadcast::Receiver<ServerMessage>,
        mut state: watch::Receiver<ConnectionState>,
    ) {
        loop {
            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }

                    let current = *state.borrow_and_update();
                    if current == ConnectionState::Open {
                        self.refetch("Resync after connect").await;
                    }
                }
                event = events.recv() => match event {
                    Ok(message) => self.handle(message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event pump skipped {skipped} messages, refetching");
                        self.refetch("Resync after lag").await;
                    }
                    Err(RecvError::Closed) => return,
                },
            }

            if !self.guard.is_current() {
                debug!("Event pump for shop {} stopped", self.guard.shop_id());
                return;
            }
        }
    }

    async fn handle(&self, message: ServerMessage) {
        let result = match message {
            ServerMessage::QueueUpdate {
                queue_items: Some(queue_items),
                appointments,
                completed_items,
            } => {
                self.queue
                    .apply_pushed_snapshot(&self.guard, queue_items, appointments, completed_items)
                    .await
            }
            ServerMessage::QueueUpdate {
                queue_items: None, ..
            } => {
                self.refetch("Refetch on queue update").await;
                Ok(())
            }
            ServerMessage::NewEntry { entry } => {
                self.queue.apply_delta(&self.guard, entry).await.map(drop)
            }
            ServerMessage::AppointmentUpdate { appointment } => self
                .queue
                .apply_delta(&self.guard, appointment)
                .await
                .map(drop),
            ServerMessage::Unknown => Ok(()),
        };

        self.settle("Queue push", result);
    }

    async fn refetch(&self, action: &str) {
        let result = match self.api.fetch_snapshot(self.guard.shop_id()).await {
            Ok(snapshot) => self.queue.apply_snapshot(&self.guard, snapshot).await,
            Err(err) => Err(err),
        };

        self.settle(action, result);
    }

    fn settle(&self, action: &str, result: Result<(), SyncError>) {
        match result {
            Ok(()) => {}
            Err(SyncError::StaleContext) => debug!("{action} dropped, shop switched"),
            Err(err) => self.queue.notifier().report(action, &err),
        }
    }
}
