//! Reproduces the recorded cadence between frames.
//!
//! Delays come from consecutive original timestamps, never from a running
//! wall clock, so sleep overhead shows up as drift but does not compound
//! into extra waits.

use crate::playback::Shutdown;
use std::time::Duration;

/// Wait needed between two recorded timestamps; zero when time does not advance
pub fn delay_for(prev_timestamp: f64, curr_timestamp: f64) -> Duration {
    let delta = curr_timestamp - prev_timestamp;
    if delta > 0.0 {
        Duration::try_from_secs_f64(delta).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

/// Tracks the previous record's timestamp across a replay
#[derive(Debug, Clone)]
pub struct Pacer {
    prev: Option<f64>,
    speed: f64,
}

impl Pacer {
    pub fn new(speed: f64) -> Self {
        Self { prev: None, speed }
    }

    /// Delay before the record stamped `timestamp`; the first record never waits
    pub fn next_delay(&mut self, timestamp: f64) -> Duration {
        let delay = match self.prev {
            Some(prev) => delay_for(prev, timestamp),
            None => Duration::ZERO,
        };
        self.prev = Some(timestamp);

        if self.speed > 0.0 && self.speed != 1.0 {
            delay.div_f64(self.speed)
        } else {
            delay
        }
    }
}

/// Sleep for `delay` unless shutdown fires first. Returns `false` when cancelled.
pub async fn wait(delay: Duration, shutdown: &mut Shutdown) -> bool {
    if delay.is_zero() {
        return !shutdown.is_triggered();
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.triggered() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::shutdown_channel;
    use std::time::Instant;

    #[test]
    fn test_delay_for() {
        assert_eq!(delay_for(10.0, 10.0), Duration::ZERO);
        assert_eq!(delay_for(10.0, 9.5), Duration::ZERO);
        assert_eq!(delay_for(1.0, 1.25), Duration::from_millis(250));
        assert_eq!(delay_for(0.0, f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_pacer_uses_original_timestamps() {
        let mut pacer = Pacer::new(1.0);
        assert_eq!(pacer.next_delay(5.0), Duration::ZERO);
        assert_eq!(pacer.next_delay(5.5), Duration::from_millis(500));
        // Going backwards replays immediately and becomes the new reference
        assert_eq!(pacer.next_delay(5.0), Duration::ZERO);
        assert_eq!(pacer.next_delay(5.25), Duration::from_millis(250));
    }

    #[test]
    fn test_pacer_speed() {
        let mut pacer = Pacer::new(2.0);
        pacer.next_delay(0.0);
        assert_eq!(pacer.next_delay(1.0), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_wait_sleeps() {
        let mut shutdown = Shutdown::never();
        let start = Instant::now();
        assert!(wait(Duration::from_millis(30), &mut shutdown).await);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_wait_is_interrupted() {
        let (trigger, mut shutdown) = shutdown_channel();
        let start = Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        assert!(!wait(Duration::from_secs(30), &mut shutdown).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
