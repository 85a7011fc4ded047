//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broadcasts a single shutdown signal to every background task.
///
/// Clones share the same signal.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver for the signal. Subscribing after the trigger yields a
    /// receiver that never fires; check `is_triggered` first.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Only the first call has an effect.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            tracing::info!(tasks = self.tx.receiver_count(), "Shutdown triggered");
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for `tasks` to finish, aborting whatever is left after `deadline`.
///
/// Returns true if every task finished on its own.
pub async fn drain(tasks: Vec<JoinHandle<()>>, deadline: Duration) -> bool {
    let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();

    let joined = tokio::time::timeout(deadline, async {
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Background task panicked");
                }
            }
        }
    })
    .await;

    match joined {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(deadline = ?deadline, "Drain deadline exceeded, aborting remaining tasks");
            for handle in aborts {
                handle.abort();
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_every_subscriber_once() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.clone().subscribe();

        shutdown.trigger();
        shutdown.trigger();

        assert!(shutdown.is_triggered());
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
        assert!(a.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_stragglers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let polite = tokio::spawn(async move {
            let _ = rx.recv().await;
        });
        let stubborn = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        shutdown.trigger();
        assert!(!drain(vec![polite, stubborn], Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_drain_completes() {
        let task = tokio::spawn(async {});
        assert!(drain(vec![task], Duration::from_secs(1)).await);
    }
}
