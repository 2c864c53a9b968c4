pub mod aggregator;
pub mod pacer;
pub mod worker;

pub use aggregator::{run_workers, Assignment};
pub use pacer::{delay_for, Pacer};
pub use worker::ReplayWorker;

use crate::core::FramePolicy;
use std::time::Duration;
use tokio::sync::watch;

/// How long a worker waits for the loopback echo of each frame
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Replay worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerState {
    Idle,
    Running,
    Finished,
}

/// Options shared by every worker of a run
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub receive_timeout: Duration,
    pub speed: f64,  // 1.0 = real-time, 2.0 = 2x speed
    pub policy: FramePolicy,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            speed: 1.0,
            policy: FramePolicy::default(),
        }
    }
}

impl ReplayOptions {
    /// Set playback speed
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.clamp(0.1, 10.0);
        self
    }
}

/// Creates a linked shutdown trigger and listener
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown(rx))
}

/// Requests every worker of a run to stop
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Cooperative cancellation signal observed by workers
#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    /// A signal that never fires
    pub fn never() -> Self {
        shutdown_channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown is requested; pends forever if the trigger is gone
    pub async fn triggered(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(ReplayOptions::default().with_speed(100.0).speed, 10.0);
        assert_eq!(ReplayOptions::default().with_speed(0.0).speed, 0.1);
        assert_eq!(ReplayOptions::default().receive_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let (trigger, mut shutdown) = shutdown_channel();
        let observer = shutdown.clone();
        assert!(!observer.is_triggered());

        trigger.trigger();
        shutdown.triggered().await;
        assert!(observer.is_triggered());
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let mut shutdown = Shutdown::never();
        let fired = tokio::time::timeout(Duration::from_millis(20), shutdown.triggered()).await;
        assert!(fired.is_err());
        assert!(!shutdown.is_triggered());
    }
}
