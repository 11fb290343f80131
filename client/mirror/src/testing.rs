//! Fakes shared by the unit tests.
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use queue::{
    Appointment, EntryId, EntryStatus, EntryUpdate, Id, QueueEntry, QueueSnapshot, ReorderRequest,
};
use tokio::{
    sync::{Semaphore, mpsc},
    time::Instant,
};

use crate::{
    api::QueueApi,
    error::SyncError,
    notice::SessionHandler,
    transport::{Connector, Frame, Socket},
};

pub fn entry(id: i64, position: u32, status: EntryStatus) -> QueueEntry {
    QueueEntry::new(Id::Number(id), status).with_position(position)
}

pub fn ids(values: &[i64]) -> Vec<EntryId> {
    values.iter().map(|value| Id::Number(*value)).collect()
}

pub fn snapshot(queue_items: Vec<QueueEntry>) -> QueueSnapshot {
    QueueSnapshot {
        queue_items,
        ..QueueSnapshot::default()
    }
}

#[derive(Default)]
pub struct CountingSession(AtomicUsize);

impl CountingSession {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl SessionHandler for CountingSession {
    fn session_expired(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds the error a failing call returns. `SyncError` is not `Clone`.
pub type Failure = fn() -> SyncError;

pub fn rejected() -> SyncError {
    SyncError::Rejected {
        status: reqwest::StatusCode::CONFLICT,
        message: "position taken".to_string(),
    }
}

pub fn unauthorized() -> SyncError {
    SyncError::Unauthorized
}

pub fn refused() -> SyncError {
    SyncError::Connect("refused".to_string())
}

#[derive(Default)]
pub struct FakeApi {
    snapshot: Mutex<QueueSnapshot>,
    appointments: Mutex<Vec<Appointment>>,
    snapshot_failure: Mutex<Option<Failure>>,
    moved: Mutex<Vec<QueueEntry>>,
    move_failure: Mutex<Option<Failure>>,
    move_gate: Option<Arc<Semaphore>>,
    snapshot_calls: AtomicUsize,
    appointment_calls: AtomicUsize,
    pub move_requests: Mutex<Vec<ReorderRequest>>,
    pub updates: Mutex<Vec<(EntryId, EntryUpdate)>>,
}

impl FakeApi {
    pub fn new(snapshot: QueueSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// `move_entry` waits for a permit on the returned semaphore.
    pub fn gated(snapshot: QueueSnapshot) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let api = Self {
            move_gate: Some(gate.clone()),
            ..Self::new(snapshot)
        };

        (api, gate)
    }

    pub fn set_snapshot(&self, snapshot: QueueSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn set_appointments(&self, appointments: Vec<Appointment>) {
        *self.appointments.lock().unwrap() = appointments;
    }

    pub fn fail_snapshots(&self, failure: Option<Failure>) {
        *self.snapshot_failure.lock().unwrap() = failure;
    }

    pub fn reply_to_moves(&self, entries: Vec<QueueEntry>) {
        *self.moved.lock().unwrap() = entries;
    }

    pub fn fail_moves(&self, failure: Failure) {
        *self.move_failure.lock().unwrap() = Some(failure);
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn appointment_calls(&self) -> usize {
        self.appointment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueApi for FakeApi {
    async fn fetch_snapshot(&self, _shop_id: &str) -> Result<QueueSnapshot, SyncError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = *self.snapshot_failure.lock().unwrap() {
            return Err(failure());
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn fetch_appointments(&self, _shop_id: &str) -> Result<Vec<Appointment>, SyncError> {
        self.appointment_calls.fetch_add(1, Ordering::SeqCst);

        Ok(self.appointments.lock().unwrap().clone())
    }

    async fn update_entry(
        &self,
        _shop_id: &str,
        entry_id: &EntryId,
        update: &EntryUpdate,
    ) -> Result<QueueEntry, SyncError> {
        self.updates
            .lock()
            .unwrap()
            .push((entry_id.clone(), update.clone()));

        let current = self
            .snapshot
            .lock()
            .unwrap()
            .queue_items
            .iter()
            .find(|entry| &entry.id == entry_id)
            .cloned();
        let mut entry = current.ok_or_else(|| SyncError::UnknownEntry(entry_id.clone()))?;

        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(barber) = &update.barber_id {
            entry.assigned_barber_id = Some(barber.clone());
        }
        if let Some(service) = &update.service_id {
            entry.assigned_service_id = Some(service.clone());
        }

        Ok(entry)
    }

    async fn move_entry(
        &self,
        _shop_id: &str,
        request: &ReorderRequest,
    ) -> Result<Vec<QueueEntry>, SyncError> {
        self.move_requests.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.move_gate {
            gate.acquire().await.unwrap().forget();
        }

        if let Some(failure) = *self.move_failure.lock().unwrap() {
            return Err(failure());
        }
        Ok(self.moved.lock().unwrap().clone())
    }
}

enum Tail {
    Drop,
    Hang,
    Feed(mpsc::UnboundedReceiver<Frame>),
}

/// Replays a fixed list of frames, then drops, hangs or follows a feed.
pub struct ScriptedSocket {
    frames: VecDeque<Frame>,
    tail: Tail,
}

impl ScriptedSocket {
    pub fn dropping(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            tail: Tail::Drop,
        }
    }

    pub fn hanging(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            tail: Tail::Hang,
        }
    }
}

#[async_trait]
impl Socket for ScriptedSocket {
    async fn next_frame(&mut self) -> Option<Result<Frame, SyncError>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }

        match &mut self.tail {
            Tail::Drop => None,
            Tail::Hang => std::future::pending().await,
            Tail::Feed(feed) => feed.recv().await.map(Ok),
        }
    }

    async fn close(&mut self) {}
}

type Script = Box<dyn Fn(usize) -> Result<ScriptedSocket, SyncError> + Send + Sync>;

pub struct ScriptedConnector {
    script: Script,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub fn new(
        script: impl Fn(usize) -> Result<ScriptedSocket, SyncError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// First connection follows the returned sender, later ones hang.
    pub fn with_feed() -> (Self, mpsc::UnboundedSender<Frame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let feed = Mutex::new(Some(receiver));

        let connector = Self::new(move |_| {
            Ok(match feed.lock().unwrap().take() {
                Some(receiver) => ScriptedSocket {
                    frames: VecDeque::new(),
                    tail: Tail::Feed(receiver),
                },
                None => ScriptedSocket::hanging(Vec::new()),
            })
        });

        (connector, sender)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Socket>, SyncError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            attempts.len() - 1
        };

        let socket = (self.script)(attempt)?;
        Ok(Box::new(socket))
    }
}
