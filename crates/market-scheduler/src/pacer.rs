use std::time::Duration;
use tokio::time::Instant;

/// Minimum-interval pacing between external quote calls.
///
/// Owned by the scheduler and passed where needed, so each cycle (and each
/// test) gets its own isolated pacing state instead of a process-wide
/// last-request variable.
pub struct Pacer {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    /// Sleep until the minimum interval since the previous call has passed,
    /// then stamp this call. First call never waits.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}
