//! Client-side mirror of a barbershop walk-in queue.
//!
//!
//!
//! # Data Sources
//! - Initial REST fetch of the full snapshot when a shop is opened
//! - WebSocket pushes on `/ws/queue/{shop_id}`, snapshots or single-entry deltas
//! - Polling fallback on a fixed interval, only while the socket is not open
//! - All three land in one [`QueueStore`], the only authoritative state
//!
//!
//!
//! # Consistency
//!
//! **Goal**: whatever order the three sources deliver in, the user sees one queue with unique positions.
//!
//! - Snapshots replace the whole store, deltas replace or append one entry
//! - Last applied write wins, there is no timestamp comparison
//! - Terminal entries (`COMPLETED`, `CANCELLED`, `NO_SHOW`) never come back as active
//! - A drag lives in an overlay next to the store and is never written into it
//! - Every async completion carries a [`ContextGuard`] and is dropped if the shop changed meanwhile
//!
//!
//!
//! # Failure Handling
//! - Socket drop: `CLOSED`, one reconnect after 5 seconds, forever, polling covers the gap
//! - Poll failure: logged, [`SyncNotice::TransientError`], next tick retries
//! - `401` anywhere: [`SessionHandler::session_expired`] before anything else
//! - Reorder failure: overlay dropped, [`SyncNotice::ReorderRolledBack`]
//! - Initial load failure: returned from [`ConnectionManager::init`], the caller decides
//!
//!
//!
//! # Configuration
//!
//! Read by [`Config::load`], defaults in parentheses.
//!
//! - `QUEUE_API_URL` (`http://localhost:8000`), socket URL derived from it
//! - `QUEUE_API_TOKEN`, from `/run/secrets/QUEUE_API_TOKEN` or the environment
//! - `QUEUE_POLL_MS` (`10000`)
//! - `QUEUE_APPOINTMENT_POLL_MS` (`15000`)
//! - `QUEUE_RECONNECT_MS` (`5000`)
//!
//! Logging goes through `tracing`, filtered by `RUST_LOG` in the binary.
//! ```sh
//! RUST_LOG=mirror=debug queue-watch 7
//! ```
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod notice;
pub mod polling;
pub mod projection;
pub mod reorder;
pub mod shared;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{HttpApi, QueueApi};
pub use config::Config;
pub use context::{ContextGuard, ShopContext};
pub use error::{ErrorClass, SyncError};
pub use manager::ConnectionManager;
pub use notice::{LogSession, Notifier, SessionHandler, SyncNotice};
pub use polling::{PollIntervals, Poller};
pub use projection::{QueueView, project, project_with_order};
pub use reorder::{DragPhase, ReorderController};
pub use shared::SharedQueue;
pub use store::{DeltaOutcome, QueueStore};
pub use transport::{
    ConnectionState, Connector, Frame, ReconnectMachine, Socket, Transport, WsConnector,
};
