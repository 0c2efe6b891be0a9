//! Notification history and polling of long-running operations.

use super::async_job::AsyncJob;
use std::collections::VecDeque;

/// Oldest entries are dropped beyond this
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Clone, Debug)]
pub struct NotificationEntry {
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

impl NotificationEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: chrono::Local::now(),
        }
    }

    pub fn time_ago(&self) -> String {
        let duration = chrono::Local::now().signed_duration_since(self.timestamp);
        if duration.num_seconds() < 60 {
            "just now".to_string()
        } else if duration.num_minutes() < 60 {
            format!("{}m ago", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h ago", duration.num_hours())
        } else {
            self.timestamp.format("%m/%d %H:%M").to_string()
        }
    }
}

pub fn push_notification(notifications: &mut VecDeque<NotificationEntry>, message: impl Into<String>) {
    notifications.push_back(NotificationEntry::new(message));
    while notifications.len() > MAX_NOTIFICATIONS {
        notifications.pop_front();
    }
}

/// Extra guidance for errors the user can act on
pub fn failure_hint(error_msg: &str) -> Option<&'static str> {
    let lower = error_msg.to_lowercase();
    if lower.contains("apdu") || lower.contains("6a80") || lower.contains("invalid_data") {
        Some("Make sure \"Blind Signing\" is enabled in your Ledger Ethereum app settings.")
    } else if lower.contains("rejected") || lower.contains("denied") {
        Some("The request was rejected on the signing device.")
    } else if lower.contains("is not an owner") {
        Some("Connect one of the Safe's owner accounts to create transactions.")
    } else if lower.contains("is not the delegate") {
        Some("Spending limits can only be used by the account they were granted to.")
    } else if lower.contains("private_key") {
        Some("Set PRIVATE_KEY in your environment or switch to Ledger in Settings.")
    } else {
        None
    }
}

pub fn format_failure(error_msg: &str) -> String {
    match failure_hint(error_msg) {
        Some(hint) => format!("[!!] Failed: {}\n\n{}", error_msg, hint),
        None => format!("[!!] Failed: {}", error_msg),
    }
}

/// An operation whose job yields a success message
pub trait OperationState {
    fn job_mut(&mut self) -> &mut Option<AsyncJob<String>>;
    fn status_mut(&mut self) -> &mut Option<String>;
}

/// Poll `state`'s job and record the outcome. Returns true on the frame the job finished.
pub fn poll_operation_state<T: OperationState>(
    state: &mut T,
    notifications: &mut VecDeque<NotificationEntry>,
) -> bool {
    let Some(res) = state.job_mut().as_mut().and_then(|job| job.poll()) else {
        return false;
    };

    match res {
        Ok(message) => {
            *state.status_mut() = Some(format!("[OK] {}", message));
            push_notification(notifications, message);
        }
        Err(e) => {
            let error_msg = format!("{:#}", e);
            tracing::error!("Operation failed: {}", error_msg);
            *state.status_mut() = Some(format_failure(&error_msg));
            push_notification(notifications, format!("Operation failed: {}", error_msg));
        }
    }
    *state.job_mut() = None;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::mpsc;

    #[derive(Default)]
    struct TestOperation {
        job: Option<AsyncJob<String>>,
        status: Option<String>,
    }

    impl OperationState for TestOperation {
        fn job_mut(&mut self) -> &mut Option<AsyncJob<String>> {
            &mut self.job
        }

        fn status_mut(&mut self) -> &mut Option<String> {
            &mut self.status
        }
    }

    fn finished(result: anyhow::Result<String>) -> TestOperation {
        let (tx, rx) = mpsc::channel();
        tx.send(result).unwrap();
        TestOperation {
            job: Some(AsyncJob::new(rx)),
            status: None,
        }
    }

    #[test]
    fn test_time_ago_just_now() {
        assert_eq!(NotificationEntry::new("hi").time_ago(), "just now");
    }

    #[test]
    fn test_time_ago_minutes() {
        let mut entry = NotificationEntry::new("hi");
        entry.timestamp -= chrono::Duration::minutes(5);
        assert_eq!(entry.time_ago(), "5m ago");
    }

    #[test]
    fn test_push_notification_caps_history() {
        let mut notifications = VecDeque::new();
        for i in 0..MAX_NOTIFICATIONS + 3 {
            push_notification(&mut notifications, format!("n{}", i));
        }
        assert_eq!(notifications.len(), MAX_NOTIFICATIONS);
        assert_eq!(notifications.front().unwrap().message, "n3");
    }

    #[test]
    fn test_failure_hint() {
        assert!(failure_hint("APDU error 6a80").unwrap().contains("Blind Signing"));
        assert!(failure_hint("0xab is not an owner of Safe 0xcd").unwrap().contains("owner"));
        assert!(failure_hint("Connected account 0x1 is not the delegate 0x2")
            .unwrap()
            .contains("granted"));
        assert!(failure_hint("timeout").is_none());
    }

    #[test]
    fn test_poll_operation_state_success() {
        let mut op = finished(Ok("Transaction proposed".to_string()));
        let mut notifications = VecDeque::new();

        assert!(poll_operation_state(&mut op, &mut notifications));
        assert!(op.job.is_none());
        assert_eq!(op.status.as_deref(), Some("[OK] Transaction proposed"));
        assert_eq!(notifications.back().unwrap().message, "Transaction proposed");
    }

    #[test]
    fn test_poll_operation_state_failure_adds_hint() {
        let mut op = finished(Err(anyhow!("Request was rejected on the Ledger device.")));
        let mut notifications = VecDeque::new();

        assert!(poll_operation_state(&mut op, &mut notifications));
        let status = op.status.unwrap();
        assert!(status.starts_with("[!!] Failed"));
        assert!(status.contains("rejected on the signing device"));
        assert!(notifications.back().unwrap().message.starts_with("Operation failed"));
    }

    #[test]
    fn test_poll_operation_state_idle() {
        let mut op = TestOperation::default();
        let mut notifications = VecDeque::new();
        assert!(!poll_operation_state(&mut op, &mut notifications));
        assert!(notifications.is_empty());
    }
}
