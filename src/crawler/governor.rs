//! Adaptive pacing of requests against the paginated query endpoint
//!
//! Each throttled request grows the delay before the next one along the curve
//! `2.5 * log10(n + 1)` seconds, where `n` is the number of throttled requests
//! so far, until the configured maximum is reached. The very first query of a
//! session goes out immediately.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Scale of the logarithmic growth curve, in seconds
const GROWTH_SCALE_SECS: f64 = 2.5;

/// Computes the delay that follows `current`, clamped to `[0, max]`
///
/// The current delay is mapped back to the request count that produced it,
/// and the delay for one more request is returned, truncated to whole
/// milliseconds.
pub fn next_delay(current: Duration, max: Duration) -> Duration {
    let current_secs = current.as_secs_f64();
    let request_count = 10f64.powf(current_secs / GROWTH_SCALE_SECS).round();
    let next_secs = GROWTH_SCALE_SECS * (request_count + 1.0).log10();

    if !next_secs.is_finite() {
        return max;
    }
    if next_secs <= 0.0 {
        return Duration::ZERO;
    }

    let next = Duration::from_millis((next_secs * 1000.0) as u64);
    next.min(max)
}

#[derive(Debug)]
struct GovernorState {
    /// Delay armed for the next query
    delay: Duration,

    /// Earliest instant the next query may be released, `None` before the first one
    ready_at: Option<Instant>,
}

/// Per-session pacing for paginated queries
///
/// Callers are released one at a time: a worker holds the state lock while it
/// waits, so concurrent page handlers queue up behind each other.
#[derive(Debug)]
pub struct RateGovernor {
    max_delay: Duration,
    state: Mutex<GovernorState>,
}

impl RateGovernor {
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay,
            state: Mutex::new(GovernorState {
                delay: Duration::ZERO,
                ready_at: None,
            }),
        }
    }

    /// Whether a request URL targets the paginated query endpoint
    pub fn applies_to(url: &str) -> bool {
        url::Url::parse(url)
            .map(|parsed| parsed.path().contains("graphql"))
            .unwrap_or(false)
    }

    /// Blocks until the next query may be issued, then arms the following delay
    ///
    /// Returns the delay armed for the next caller.
    pub async fn throttle(&self) -> Duration {
        let mut state = self.state.lock().await;

        if let Some(ready_at) = state.ready_at {
            tokio::time::sleep_until(ready_at).await;
        }

        state.delay = next_delay(state.delay, self.max_delay);
        state.ready_at = Some(Instant::now() + state.delay);
        tracing::debug!("next query delayed by {:?}", state.delay);

        state.delay
    }

    /// Delay currently armed for the next query
    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.delay
    }
}
