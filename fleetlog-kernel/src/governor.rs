//! Token-bucket rate governor shared by every collector of a run.
//!
//! The bucket refills at `qps` tokens per second up to `burst`. `wait`
//! reserves a token up front (the balance may go negative) and sleeps until
//! the reservation matures, so concurrent waiters queue behind each other
//! instead of racing for the same refill.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limiter wait cancelled")]
pub struct WaitCancelled;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

#[derive(Debug)]
pub struct RateGovernor {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateGovernor {
    /// `qps` must be positive; a zero burst is raised to one
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    pub fn qps(&self) -> f64 {
        self.qps
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last = now;
    }

    /// Takes a token if one is available right now
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Blocks until a token is available or `cancel` fires
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), WaitCancelled> {
        if cancel.is_cancelled() {
            return Err(WaitCancelled);
        }

        let delay = {
            let mut bucket = self.bucket.lock();
            self.refill(&mut bucket, Instant::now());
            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                return Ok(());
            }
            // tiny rates overflow Duration; wait "forever" instead
            Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => {
                // hand the reservation back
                let mut bucket = self.bucket.lock();
                self.refill(&mut bucket, Instant::now());
                bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
                Err(WaitCancelled)
            }
        }
    }

    /// Gate in front of every remote command: probe, then wait if denied
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), WaitCancelled> {
        if self.allow() {
            return Ok(());
        }
        debug!(qps = self.qps, burst = self.burst(), "waiting for rate limiter");
        let waited = self.wait(cancel).await;
        debug!(qps = self.qps, burst = self.burst(), cancelled = waited.is_err(), "waited for rate limiter");
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_allow_spends_burst_then_denies() {
        let governor = RateGovernor::new(10.0, 3);
        assert!(governor.allow());
        assert!(governor.allow());
        assert!(governor.allow());
        assert!(!governor.allow());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(governor.allow());
        assert!(!governor.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_paces_at_rate() {
        let governor = RateGovernor::new(4.0, 1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..5 {
            governor.acquire(&cancel).await.unwrap();
        }

        // one from the burst, four paced at 250ms
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_workers_never_exceed_rate() {
        let qps = 20.0;
        let burst = 5;
        let governor = Arc::new(RateGovernor::new(qps, burst));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let governor = governor.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    governor.acquire(&cancel).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // 80 commands: 5 from the burst, 75 at 20/s
        let min = Duration::from_secs_f64((80.0 - burst as f64) / qps);
        assert!(start.elapsed() >= min, "took {:?}, expected >= {:?}", start.elapsed(), min);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let governor = Arc::new(RateGovernor::new(1.0, 1));
        let cancel = CancellationToken::new();
        assert!(governor.allow());

        let waiter = {
            let governor = governor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { governor.wait(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(WaitCancelled));
        assert_eq!(governor.wait(&cancel).await, Err(WaitCancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanishing_rate_waits_until_cancelled() {
        let governor = Arc::new(RateGovernor::new(1e-20, 1));
        let cancel = CancellationToken::new();
        assert!(governor.allow());

        let waiter = {
            let governor = governor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { governor.acquire(&cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!waiter.is_finished());

        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(WaitCancelled));
    }
}
