use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque backend identifier. Kept in whatever shape the backend sent so it
/// round-trips unchanged in request bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Text(String),
}

pub type EntryId = Id;

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Text(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    #[serde(alias = "scheduled")]
    Scheduled,
    #[serde(alias = "arrived")]
    Arrived,
    #[serde(alias = "checked_in")]
    CheckedIn,
    #[serde(alias = "in_service")]
    InService,
    #[serde(alias = "completed")]
    Completed,
    #[serde(alias = "cancelled")]
    Cancelled,
    #[serde(alias = "no_show")]
    NoShow,
}

impl EntryStatus {
    /// Statuses that take part in position ordering.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            EntryStatus::Arrived | EntryStatus::CheckedIn | EntryStatus::InService
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryStatus::Completed | EntryStatus::Cancelled | EntryStatus::NoShow
        )
    }

    const fn stage(self) -> u8 {
        match self {
            EntryStatus::Scheduled => 0,
            EntryStatus::Arrived => 1,
            EntryStatus::CheckedIn => 2,
            EntryStatus::InService => 3,
            EntryStatus::Completed | EntryStatus::Cancelled | EntryStatus::NoShow => 4,
        }
    }

    /// Checks a status move against the monotonic lifecycle.
    pub fn transition(self, next: EntryStatus) -> Result<EntryStatus, TransitionError> {
        if self == next {
            return Ok(next);
        }

        if self.is_terminal() {
            return Err(TransitionError::FromTerminal { from: self, to: next });
        }

        if next.stage() < self.stage() {
            return Err(TransitionError::Backwards { from: self, to: next });
        }

        Ok(next)
    }
}

impl Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryStatus::Scheduled => "SCHEDULED",
            EntryStatus::Arrived => "ARRIVED",
            EntryStatus::CheckedIn => "CHECKED_IN",
            EntryStatus::InService => "IN_SERVICE",
            EntryStatus::Completed => "COMPLETED",
            EntryStatus::Cancelled => "CANCELLED",
            EntryStatus::NoShow => "NO_SHOW",
        };

        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{from} is terminal, cannot move to {to}")]
    FromTerminal { from: EntryStatus, to: EntryStatus },

    #[error("{from} cannot move back to {to}")]
    Backwards { from: EntryStatus, to: EntryStatus },
}

fn default_party_size() -> u32 {
    1
}

/// One walk-in or appointment record as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,

    #[serde(default)]
    pub position: Option<u32>,

    pub status: EntryStatus,

    #[serde(default, alias = "created_at")]
    pub check_in_time: Option<DateTime<Utc>>,

    #[serde(default, alias = "barber_id")]
    pub assigned_barber_id: Option<Id>,

    #[serde(default, alias = "service_id")]
    pub assigned_service_id: Option<Id>,

    #[serde(default = "default_party_size")]
    pub party_size: u32,

    #[serde(default, alias = "full_name")]
    pub customer_name: Option<String>,

    #[serde(default)]
    pub appointment_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub service_start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub service_end_time: Option<DateTime<Utc>>,
}

/// Appointments travel in the same shape, ordered by `appointment_time`.
pub type Appointment = QueueEntry;

impl QueueEntry {
    pub fn new(id: impl Into<EntryId>, status: EntryStatus) -> Self {
        Self {
            id: id.into(),
            position: None,
            status,
            check_in_time: None,
            assigned_barber_id: None,
            assigned_service_id: None,
            party_size: default_party_size(),
            customer_name: None,
            appointment_time: None,
            service_start_time: None,
            service_end_time: None,
        }
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_check_in(mut self, at: DateTime<Utc>) -> Self {
        self.check_in_time = Some(at);
        self
    }

    pub fn with_appointment_time(mut self, at: DateTime<Utc>) -> Self {
        self.appointment_time = Some(at);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
