use serde::{Deserialize, Serialize};

use crate::entry::{Appointment, QueueEntry};

/// Pushes on `/ws/queue/{shop_id}`. Unknown `type` values land in
/// [`ServerMessage::Unknown`] and are ignored by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Carries a full snapshot when `queue_items` is present, otherwise only
    /// signals that the queue changed.
    QueueUpdate {
        #[serde(default)]
        queue_items: Option<Vec<QueueEntry>>,
        #[serde(default)]
        appointments: Option<Vec<Appointment>>,
        #[serde(default)]
        completed_items: Option<Vec<QueueEntry>>,
    },

    NewEntry {
        #[serde(alias = "data")]
        entry: QueueEntry,
    },

    AppointmentUpdate {
        #[serde(alias = "data")]
        appointment: Appointment,
    },

    #[serde(other)]
    Unknown,
}

pub fn decode_message(payload: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryStatus, Id};

    #[test]
    fn test_decodes_new_entry() {
        let message = decode_message(
            r#"{"type":"new_entry","entry":{"id":3,"position":3,"status":"ARRIVED"}}"#,
        )
        .unwrap();

        match message {
            ServerMessage::NewEntry { entry } => {
                assert_eq!(entry.id, Id::Number(3));
                assert_eq!(entry.status, EntryStatus::Arrived);
            }
            other => panic!("expected new_entry, got {other:?}"),
        }
    }

    #[test]
    fn test_queue_update_without_items_is_a_signal() {
        let message = decode_message(r#"{"type":"queue_update"}"#).unwrap();

        assert_eq!(
            message,
            ServerMessage::QueueUpdate {
                queue_items: None,
                appointments: None,
                completed_items: None,
            }
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let message = decode_message(r#"{"type":"barber_break","barber_id":4}"#).unwrap();
        assert_eq!(message, ServerMessage::Unknown);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(decode_message("{not json").is_err());
        assert!(decode_message(r#"{"type":"new_entry"}"#).is_err());
    }
}
