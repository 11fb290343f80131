use std::sync::Arc;

use queue::EntryId;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::error::{ErrorClass, SyncError};

const NOTICE_CAPACITY: usize = 64;

/// Non-blocking, user-facing messages. The UI layer renders these as
/// toasts or banners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    TransientError { message: String },
    Rejected { message: String },
    SessionExpired,
    ReorderRolledBack { entry_id: EntryId, reason: String },
}

/// External re-authentication flow, invoked on any 401.
pub trait SessionHandler: Send + Sync {
    fn session_expired(&self);
}

/// Session handler that only logs.
pub struct LogSession;

impl SessionHandler for LogSession {
    fn session_expired(&self) {
        error!("Queue API session expired");
    }
}

#[derive(Clone)]
pub struct Notifier {
    notices: broadcast::Sender<SyncNotice>,
    session: Arc<dyn SessionHandler>,
}

impl Notifier {
    pub fn new(session: Arc<dyn SessionHandler>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self { notices, session }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    pub fn send(&self, notice: SyncNotice) {
        // No subscribers is fine, nobody is looking.
        let _ = self.notices.send(notice);
    }

    pub fn session_expired(&self) {
        self.session.session_expired();
        self.send(SyncNotice::SessionExpired);
    }

    /// Routes a request failure by its class.
    pub fn report(&self, action: &str, err: &SyncError) {
        match err.class() {
            ErrorClass::Transient => {
                warn!("{action} failed, will retry: {err}");
                self.send(SyncNotice::TransientError {
                    message: format!("{action}: {err}"),
                });
            }
            ErrorClass::Authorization => {
                warn!("{action} unauthorized");
                self.session_expired();
            }
            ErrorClass::Rejected => {
                warn!("{action} rejected: {err}");
                self.send(SyncNotice::Rejected {
                    message: err.to_string(),
                });
            }
            ErrorClass::Malformed => warn!("{action} returned a malformed payload: {err}"),
            ErrorClass::Usage => debug!("{action} skipped: {err}"),
        }
    }
}
