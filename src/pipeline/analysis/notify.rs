//! Fire-and-forget single-stock notifications.
//!
//! The orchestrator hands a `Notification` to a bounded queue and moves on.
//! A worker task drains the queue into the `Notifier`. Delivery latency or
//! failure never reaches the analysis path.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::types::{AnalysisResult, ReportMode};
use super::AnalysisError;

/// Notification delivery collaborator (push, mail, chat webhooks...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AnalysisError>;
}

/// A finished single-stock analysis to announce.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub request_id: Uuid,
    pub stock_code: String,
    pub report_mode: ReportMode,
    pub result: AnalysisResult,
}

/// Sending half of the notification queue. Cheap to clone.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Start the delivery worker on the current tokio runtime.
    ///
    /// The worker exits once every dispatcher clone is dropped and the queue
    /// is drained; the returned handle resolves then.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let request_id = notification.request_id;
                let stock_code = notification.stock_code.clone();

                // Each delivery runs in its own task so a panicking notifier
                // cannot take the worker down with it.
                let notifier = Arc::clone(&notifier);
                let delivery =
                    tokio::spawn(async move { notifier.notify(&notification).await });

                match delivery.await {
                    Ok(Ok(())) => tracing::debug!(
                        request_id = %request_id,
                        stock_code = %stock_code,
                        "Notification delivered"
                    ),
                    Ok(Err(e)) => tracing::warn!(
                        request_id = %request_id,
                        stock_code = %stock_code,
                        error = %e,
                        "Notification delivery failed"
                    ),
                    Err(e) => tracing::error!(
                        request_id = %request_id,
                        stock_code = %stock_code,
                        error = %e,
                        "Notifier aborted during delivery"
                    ),
                }
            }
            tracing::debug!("Notification worker stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue a notification without waiting. Returns `false` when it was
    /// dropped (queue full or worker gone); that is logged, never an error.
    pub fn dispatch(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                tracing::warn!(
                    request_id = %n.request_id,
                    stock_code = %n.stock_code,
                    "Notification queue full, dropping notification"
                );
                false
            }
            Err(TrySendError::Closed(n)) => {
                tracing::warn!(
                    request_id = %n.request_id,
                    stock_code = %n.stock_code,
                    "Notification worker stopped, dropping notification"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<(), AnalysisError> {
            self.seen.lock().unwrap().push(notification.stock_code.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<(), AnalysisError> {
            Err(AnalysisError::Notification("webhook rejected".into()))
        }
    }

    /// Blocks every delivery until released.
    struct GatedNotifier {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Notifier for GatedNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<(), AnalysisError> {
            self.gate.notified().await;
            Ok(())
        }
    }

    /// Panics on its first delivery, records the rest.
    #[derive(Default)]
    struct FlakyNotifier {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn notify(&self, notification: &Notification) -> Result<(), AnalysisError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("webhook client crashed");
            }
            self.seen.lock().unwrap().push(notification.stock_code.clone());
            Ok(())
        }
    }

    fn notification(stock_code: &str) -> Notification {
        Notification {
            request_id: Uuid::new_v4(),
            stock_code: stock_code.to_string(),
            report_mode: ReportMode::Simple,
            result: AnalysisResult::new().with_field("analysis", "ok"),
        }
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, worker) = NotificationDispatcher::spawn(notifier.clone(), 8);

        assert!(dispatcher.dispatch(notification("600519")));
        assert!(dispatcher.dispatch(notification("000858")));
        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(*notifier.seen.lock().unwrap(), vec!["600519", "000858"]);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let (dispatcher, worker) = NotificationDispatcher::spawn(Arc::new(FailingNotifier), 4);
        assert!(dispatcher.dispatch(notification("600519")));
        drop(dispatcher);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn worker_survives_panicking_notifier() {
        let notifier = Arc::new(FlakyNotifier::default());
        let (dispatcher, worker) = NotificationDispatcher::spawn(notifier.clone(), 4);

        assert!(dispatcher.dispatch(notification("600519")));
        // Let the first delivery panic before queueing the next one.
        while notifier.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(dispatcher.dispatch(notification("000858")));

        drop(dispatcher);
        worker.await.unwrap();
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["000858"]);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let gate = Arc::new(Notify::new());
        let notifier = Arc::new(GatedNotifier { gate: gate.clone() });
        let (dispatcher, worker) = NotificationDispatcher::spawn(notifier, 1);

        // First is taken by the worker (blocked on the gate), second fills the queue.
        assert!(dispatcher.dispatch(notification("a")));
        tokio::task::yield_now().await;
        let mut accepted = 0;
        for code in ["b", "c", "d"] {
            if dispatcher.dispatch(notification(code)) {
                accepted += 1;
            }
        }
        assert!(accepted <= 1, "queue of one accepted {accepted}");

        worker.abort();
    }

    #[tokio::test]
    async fn closed_worker_drops_without_error() {
        let (dispatcher, worker) = NotificationDispatcher::spawn(Arc::new(FailingNotifier), 4);
        worker.abort();
        let _ = worker.await;
        assert!(!dispatcher.dispatch(notification("600519")));
    }
}
