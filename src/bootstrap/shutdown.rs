use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Shutdown state machine
///
/// States:
/// 1. Running - normal operation
/// 2. Draining - HTTP server stops accepting, background tasks stop,
///    in-flight requests finish
/// 3. Terminated - drain finished or timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Terminated,
}

/// Broadcasts shutdown progress to every long-running task.
#[derive(Debug)]
pub struct Shutdown {
    state: watch::Sender<ShutdownState>,
    drain_timeout: Duration,
}

impl Shutdown {
    pub fn new(drain_timeout: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(ShutdownState::Running);
        Arc::new(Self {
            state,
            drain_timeout,
        })
    }

    /// Get current state
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// How long the drain phase may take.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Start draining (called on SIGTERM/SIGINT)
    pub fn start_drain(&self) {
        if !self.is_running() {
            return;
        }

        info!(
            drain_timeout_secs = self.drain_timeout.as_secs(),
            "starting graceful shutdown drain"
        );
        self.state.send_replace(ShutdownState::Draining);
    }

    /// Complete shutdown
    pub fn terminate(&self) {
        if self.state() == ShutdownState::Terminated {
            return;
        }

        info!("shutdown complete");
        self.state.send_replace(ShutdownState::Terminated);
    }

    /// Resolve once the state has left `Running`.
    pub async fn stopping(&self) {
        let mut rx = self.subscribe();
        while *rx.borrow_and_update() == ShutdownState::Running {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_state_machine() {
        let shutdown = Shutdown::new(Duration::from_secs(30));
        assert_eq!(shutdown.state(), ShutdownState::Running);
        assert!(shutdown.is_running());

        shutdown.start_drain();
        assert_eq!(shutdown.state(), ShutdownState::Draining);
        assert!(!shutdown.is_running());

        // Draining is one-way
        shutdown.start_drain();
        assert_eq!(shutdown.state(), ShutdownState::Draining);

        shutdown.terminate();
        assert_eq!(shutdown.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn test_stopping_resolves_on_drain() {
        let shutdown = Shutdown::new(Duration::from_secs(1));
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.stopping().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        shutdown.start_drain();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopping_after_drain_returns_immediately() {
        let shutdown = Shutdown::new(Duration::from_secs(1));
        shutdown.start_drain();
        shutdown.stopping().await;
    }
}
