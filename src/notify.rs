//! User Notifications
//!
//! Transient messages surfaced to whoever renders the workspace. Delivery is
//! best-effort: a full or closed channel drops the message instead of
//! blocking the operation that raised it.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::models::{AnalysisJob, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    /// Job the notification concerns, for status transitions
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            title: title.into(),
            message: message.into(),
            job_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    /// Notification for a job that reached `job.status`, if that status is worth announcing
    pub fn for_transition(job: &AnalysisJob) -> Option<Self> {
        let (title, message) = match job.status {
            JobStatus::Configuring => (
                "Analysis complete",
                format!("{} is ready to configure", job.name),
            ),
            JobStatus::Trained => (
                "Training complete",
                format!("{} finished training and is ready for predictions", job.name),
            ),
            _ => return None,
        };
        let mut notification = Self::success(title, message);
        notification.job_id = Some(job.id.clone());
        Some(notification)
    }
}

/// Sending half of the notification channel
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            warn!("Dropping notification: {}", e);
        }
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Notification::error(title, message));
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Notification::success(title, message));
    }
}
