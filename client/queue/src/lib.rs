//! # Queue Types
//!
//! Shared shapes between the shop backend and the queue mirror.
//!
//! ## Entries
//!
//! - Walk-ins and appointments share one record shape, [`entry::QueueEntry`]
//! - Walk-ins are ordered by a 1-based **position**, appointments by **appointment_time**
//! - Ids are opaque, the backend sends either integers or strings
//!
//! ## Status Lifecycle
//!
//! `SCHEDULED -> ARRIVED -> CHECKED_IN -> IN_SERVICE -> COMPLETED | CANCELLED | NO_SHOW`
//!
//! - Forward skips are allowed, any non-terminal status can jump to a terminal one
//! - Nothing leaves a terminal status
//!
//! ## Wire
//!
//! - REST bodies: [`payloads`]
//! - WebSocket pushes: [`message::ServerMessage`], tagged by `type`
pub mod entry;
pub mod message;
pub mod payloads;

pub use entry::{Appointment, EntryId, EntryStatus, Id, QueueEntry, TransitionError};
pub use message::{ServerMessage, decode_message};
pub use payloads::{EntryUpdate, QueueSnapshot, ReorderRequest, ReorderResponse, ReorderedEntry};
