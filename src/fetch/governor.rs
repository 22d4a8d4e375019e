use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

/// Global pacing for outbound API calls.
///
/// Two limits apply independently of how many worker tasks exist: at most
/// `max_in_flight` requests hold a permit at once, and consecutive request
/// starts are at least `min_interval` apart.
pub struct RateGovernor {
    min_interval: Duration,
    gate: Semaphore,
    last_start: Mutex<Option<Instant>>,
}

/// Admission for one request. Dropping it frees an in-flight slot.
pub struct GovernorPermit<'a> {
    _permit: Option<SemaphorePermit<'a>>,
}

impl RateGovernor {
    pub fn new(min_interval: Duration, max_in_flight: usize) -> Self {
        Self {
            min_interval,
            gate: Semaphore::new(max_in_flight.max(1)),
            last_start: Mutex::new(None),
        }
    }

    /// Waits for an in-flight slot, then for the pacing interval.
    pub async fn acquire(&self) -> GovernorPermit<'_> {
        // Only fails once the semaphore is closed, which never happens.
        let permit = self.gate.acquire().await.ok();

        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());

        GovernorPermit { _permit: permit }
    }

    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }
}
