use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Token bucket that paces outgoing writes.
///
/// Unlike a server-side limiter this never rejects: `acquire` sleeps until a token is
/// available. Notion documents an average of three requests per second per integration.
#[derive(Clone)]
pub struct Throttle {
    rps: u32,
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last: Instant,
}

impl Throttle {
    /// `rps == 0` disables pacing.
    pub fn new(rps: u32) -> Self {
        Self {
            rps,
            state: Arc::new(Mutex::new(State {
                tokens: rps as f64,
                last: Instant::now(),
            })),
        }
    }

    pub async fn acquire(&self) {
        if self.rps == 0 {
            return;
        }
        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(state.last);
            state.last = now;

            let refill = (elapsed.as_secs_f64() * self.rps as f64).min(self.rps as f64);
            state.tokens = (state.tokens + refill).min(self.rps as f64);

            // Take the token now, even if that drives the bucket negative; the sleep below
            // pays the debt so concurrent callers queue up behind each other.
            state.tokens -= 1.0;
            if state.tokens >= 0.0 {
                return;
            }
            Duration::from_secs_f64(-state.tokens / self.rps as f64)
        };
        debug!(wait_ms = wait.as_millis(), "throttling notion write");
        tokio::time::sleep(wait).await;
    }
}
