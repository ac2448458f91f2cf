use std::{
    fmt,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::info;
use tokio::sync::{Notify, mpsc};

/// Progress reported while a generation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    LoadingImage,
    UploadingImage,
    Submitting,
    Polling,
    /// Raw job status as reported by the API, lowercased.
    JobStatus(String),
    Downloading,
    Saving,
    Saved(PathBuf),
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadingImage => f.write_str("loading image"),
            Self::UploadingImage => f.write_str("uploading image"),
            Self::Submitting => f.write_str("submitting request"),
            Self::Polling => f.write_str("polling"),
            Self::JobStatus(status) if status.is_empty() => f.write_str("status: unknown"),
            Self::JobStatus(status) => write!(f, "status: {status}"),
            Self::Downloading => f.write_str("downloading"),
            Self::Saving => f.write_str("saving"),
            Self::Saved(path) => write!(f, "saved: {}", path.display()),
        }
    }
}

pub type StatusSender = mpsc::UnboundedSender<StatusEvent>;
pub type StatusReceiver = mpsc::UnboundedReceiver<StatusEvent>;

pub fn status_channel() -> (StatusSender, StatusReceiver) {
    mpsc::unbounded_channel()
}

pub(crate) fn emit(tx: &StatusSender, event: StatusEvent) {
    info!("{event}");
    // nobody listening is fine
    let _ = tx.send(event);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Completed,
    Failed,
    Canceled,
    InProgress(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "succeeded" => Self::Succeeded,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => Self::InProgress(lower),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Completed)
    }
}

/// Cooperative cancellation flag shared between a caller and a running generation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn canceled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::parse("SUCCEEDED").is_terminal());
        assert!(JobStatus::parse("completed").is_success());
        assert!(JobStatus::parse("Failed").is_terminal());
        assert!(!JobStatus::parse("canceled").is_success());
        assert_eq!(
            JobStatus::parse("Processing"),
            JobStatus::InProgress("processing".into())
        );
        assert!(!JobStatus::parse("").is_terminal());
    }

    #[test]
    fn status_event_text() {
        assert_eq!(StatusEvent::Submitting.to_string(), "submitting request");
        assert_eq!(
            StatusEvent::JobStatus(String::new()).to_string(),
            "status: unknown"
        );
        assert_eq!(
            StatusEvent::Saved("out/a.png".into()).to_string(),
            "saved: out/a.png"
        );
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.canceled().await }
        });
        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_canceled());
    }
}
