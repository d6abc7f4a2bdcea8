//! Cooperative cancellation and periodic background jobs.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

/// Observer side of a cancellation signal. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every token. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// If the source is dropped without cancelling, this never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Run `f` every `interval` until `token` is cancelled or `f` returns `false`.
///
/// The first run happens immediately.
pub fn spawn_periodic<F, Fut>(interval: Duration, token: CancellationToken, mut f: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            if token.is_cancelled() {
                break;
            }
            if !f().await {
                break;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let source = CancellationSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        source.cancel();
        waiter.await.expect("waiter finished");
        assert!(token.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_token_stays_pending() {
        let token = CancellationToken::never();
        assert!(!token.is_cancelled());
        let outcome = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_periodic_stops_on_cancel() {
        let source = CancellationSource::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = spawn_periodic(Duration::from_secs(60), source.token(), {
            let runs = Arc::clone(&runs);
            move || {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    true
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        source.cancel();
        handle.await.expect("periodic task joined");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_spawn_periodic_stops_when_job_declines() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = spawn_periodic(Duration::from_millis(1), CancellationToken::never(), {
            let runs = Arc::clone(&runs);
            move || {
                let runs = Arc::clone(&runs);
                async move { runs.fetch_add(1, Ordering::SeqCst) < 2 }
            }
        });
        handle.await.expect("periodic task joined");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
