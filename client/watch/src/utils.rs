use mirror::{QueueView, SyncNotice};
use queue::QueueEntry;

/// Customer name when the backend sent one, `#id` otherwise.
pub fn label(entry: &QueueEntry) -> String {
    match entry.customer_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("#{}", entry.id),
    }
}

pub fn summarize(view: &QueueView) -> String {
    let waiting: Vec<String> = view
        .waiting
        .iter()
        .enumerate()
        .map(|(rank, entry)| format!("{}. {}", rank + 1, label(entry)))
        .collect();

    let mut summary = format!(
        "{} waiting [{}], {} appointments, {} completed",
        view.waiting.len(),
        waiting.join(", "),
        view.appointments.len(),
        view.completed.len()
    );

    if view.provisional {
        summary.push_str(" (unconfirmed order)");
    }

    summary
}

pub fn describe(notice: &SyncNotice) -> String {
    match notice {
        SyncNotice::TransientError { message } => format!("Connection trouble: {message}"),
        SyncNotice::Rejected { message } => format!("Server refused: {message}"),
        SyncNotice::SessionExpired => "Session expired, sign in again".to_string(),
        SyncNotice::ReorderRolledBack { entry_id, reason } => {
            format!("Move of #{entry_id} undone: {reason}")
        }
    }
}
