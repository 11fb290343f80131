use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::{Appointment, EntryId, EntryStatus, Id, QueueEntry};

/// Body of `GET /queue/{shop_id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_items: Vec<QueueEntry>,

    #[serde(default)]
    pub appointments: Vec<Appointment>,

    #[serde(default)]
    pub completed_items: Vec<QueueEntry>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.queue_items.len() + self.appointments.len() + self.completed_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Body of `PUT /shops/{shop_id}/queue/{entry_id}`. Absent fields are left
/// untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barber_id: Option<Id>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<Id>,
}

impl EntryUpdate {
    pub fn status(status: EntryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn touches_assignment(&self) -> bool {
        self.barber_id.is_some() || self.service_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderedEntry {
    pub queue_id: EntryId,
    pub new_position: u32,
}

/// Body of `PUT /shops/{shop_id}/queue/`. Always carries exactly one moved
/// entry, the backend shifts the neighbours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub reordered_entries: Vec<ReorderedEntry>,
    pub status: EntryStatus,
}

impl ReorderRequest {
    pub fn single(queue_id: EntryId, new_position: u32, status: EntryStatus) -> Self {
        Self {
            reordered_entries: vec![ReorderedEntry {
                queue_id,
                new_position,
            }],
            status,
        }
    }
}

/// The reorder endpoint answers with the moved entry, the shifted entries, or
/// a bare acknowledgement depending on backend version.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReorderResponse {
    Entries(Vec<QueueEntry>),
    Entry(QueueEntry),
    Ack(Value),
}

impl ReorderResponse {
    pub fn into_entries(self) -> Vec<QueueEntry> {
        match self {
            ReorderResponse::Entries(entries) => entries,
            ReorderResponse::Entry(entry) => vec![entry],
            ReorderResponse::Ack(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_reorder_body_shape() {
        let body = ReorderRequest::single(Id::Number(2), 1, EntryStatus::CheckedIn);
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value,
            json!({
                "reordered_entries": [{ "queue_id": 2, "new_position": 1 }],
                "status": "CHECKED_IN"
            })
        );
    }

    #[test]
    fn test_entry_update_skips_absent_fields() {
        let value = serde_json::to_value(EntryUpdate::status(EntryStatus::InService)).unwrap();
        assert_eq!(value, json!({ "status": "IN_SERVICE" }));
    }

    #[test]
    fn test_reorder_response_variants() {
        let many: ReorderResponse = serde_json::from_value(json!([
            { "id": 2, "position": 1, "status": "CHECKED_IN" },
            { "id": 1, "position": 2, "status": "CHECKED_IN" }
        ]))
        .unwrap();
        assert_eq!(many.into_entries().len(), 2);

        let one: ReorderResponse =
            serde_json::from_value(json!({ "id": 2, "position": 1, "status": "ARRIVED" })).unwrap();
        assert_eq!(one.into_entries()[0].id, Id::Number(2));

        let ack: ReorderResponse = serde_json::from_value(json!({ "message": "ok" })).unwrap();
        assert!(ack.into_entries().is_empty());
    }

    #[test]
    fn test_snapshot_tolerates_missing_lists() {
        let snapshot: QueueSnapshot =
            serde_json::from_value(json!({ "queue_items": [] })).unwrap();
        assert!(snapshot.is_empty());
    }
}
