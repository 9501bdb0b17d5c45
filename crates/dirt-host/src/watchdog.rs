//! Optional blocking detector (spec §5 "Optional blocking detector"):
//! debugging scaffolding, not production policy. The spec's model (arm an
//! alarm, try to clear it after sleeping a fraction of the interval) is an
//! OS-thread idiom; on a cooperative executor the equivalent signal is a
//! heartbeat a guarded task must keep touching — if it goes stale for a
//! full interval, the main task is judged blocked.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::error;

#[derive(Clone)]
pub struct Heartbeat {
    started_at: Instant,
    last_beat_millis: Arc<AtomicU64>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            last_beat_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn beat(&self) {
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        self.last_beat_millis.store(elapsed, Ordering::SeqCst);
    }

    fn age(&self) -> Duration {
        let last = self.last_beat_millis.load(Ordering::SeqCst);
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        Duration::from_millis(elapsed.saturating_sub(last))
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BlockingDetectorConfig {
    pub interval: Duration,
    pub raise_on_block: bool,
}

/// Runs forever, checking `heartbeat` every `interval`. Logs a warning (and,
/// if `raise_on_block` is set, returns) the first time a full interval
/// passes with no fresh beat.
pub async fn watch(name: &str, heartbeat: Heartbeat, config: BlockingDetectorConfig) {
    loop {
        tokio::time::sleep(config.interval).await;
        if heartbeat.age() >= config.interval {
            error!(worker = name, age_ms = heartbeat.age().as_millis() as u64, "main task appears blocked");
            if config.raise_on_block {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stale_heartbeat_is_detected() {
        let heartbeat = Heartbeat::new();
        heartbeat.beat();
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(heartbeat.age() >= Duration::from_millis(190));
    }
}
