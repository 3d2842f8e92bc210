use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Token-bucket pacer spacing page requests.
///
/// Refills at `qps` tokens per second up to `burst`. One token is taken per
/// request; when the bucket is short, [`Pacer::acquire`] sleeps for the
/// deficit. A zero interval disables pacing.
#[derive(Debug)]
pub struct Pacer {
    qps: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl Pacer {
    /// One request per `interval`, no bursting.
    pub fn every(interval: Duration) -> Self {
        let qps = if interval.is_zero() {
            f64::INFINITY
        } else {
            1.0 / interval.as_secs_f64()
        };
        Self {
            qps,
            burst: 1.0,
            tokens: 1.0,
            last: Instant::now(),
        }
    }

    pub fn disabled() -> Self {
        Self::every(Duration::ZERO)
    }

    /// Wait needed before the next request may go out, reserving its token.
    fn needed_wait(&mut self, now: Instant) -> Duration {
        if self.qps.is_infinite() {
            return Duration::ZERO;
        }

        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + dt * self.qps).min(self.burst);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Duration::ZERO
        } else {
            let deficit = 1.0 - self.tokens;
            // reserved now so the refill during the sleep is not counted twice
            self.tokens = 0.0;
            self.last = now;
            Duration::from_secs_f64((deficit / self.qps).max(0.0))
        }
    }

    pub async fn acquire(&mut self) {
        let wait = self.needed_wait(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "harvest.pace.waiting");
            sleep(wait).await;
            self.last = Instant::now();
        }
    }
}
