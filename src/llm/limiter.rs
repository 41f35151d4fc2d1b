use super::error::LlmError;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Client-side request spacing: at least `60 / requests_per_minute` seconds
/// between admitted requests.
///
/// The timestamp is owned by the limiter instance and written only by
/// `admit`, after its sleep completes — wait time is measured from when the
/// previous call finished waiting, so call duration cannot cause drift.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_admitted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Result<Self, LlmError> {
        if requests_per_minute == 0 {
            return Err(LlmError::Config(
                "requests per minute must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            min_interval: Duration::from_secs_f64(60.0 / f64::from(requests_per_minute)),
            last_admitted: Mutex::new(None),
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep until the minimum interval since the previous admission has
    /// elapsed, then record the admission time.
    pub async fn admit(&self) {
        let wait = {
            let last = self.last_admitted.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                Some(at) => self.min_interval.saturating_sub(at.elapsed()),
                None => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            debug!("rate limit: waiting {:.2}s before next request", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }

        let mut last = self.last_admitted.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
    }
}
