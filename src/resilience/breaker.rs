use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Process-wide cooldown after quota exhaustion.
///
/// Holds a single timestamp. While the current time is before it the breaker
/// is open and every AI-dependent operation must refuse to start. There is no
/// manual reset: the breaker closes by itself once the timestamp passes.
///
/// Built once and shared (`Arc<QuotaCircuitBreaker>`) with every consumer.
///
/// # Example
///
/// ```rust
/// use retouch_ai::resilience::QuotaCircuitBreaker;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = QuotaCircuitBreaker::new(Duration::from_secs(60));
/// assert!(!breaker.is_open());
/// breaker.trip_default();
/// assert!(breaker.is_open());
/// assert_eq!(breaker.remaining_secs(), 60);
/// # }
/// ```
#[derive(Debug)]
pub struct QuotaCircuitBreaker {
    cooldown_until: Mutex<Instant>,
    default_cooldown: Duration,
}

impl QuotaCircuitBreaker {
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            cooldown_until: Mutex::new(Instant::now()),
            default_cooldown,
        }
    }

    /// Open means AI features are disabled.
    pub fn is_open(&self) -> bool {
        Instant::now() < *self.cooldown_until.lock()
    }

    /// Open the breaker for `duration`.
    ///
    /// A trip while already open changes nothing; the running cooldown is
    /// neither shortened nor extended. Returns whether this call opened it.
    pub fn trip(&self, duration: Duration) -> bool {
        let now = Instant::now();
        let mut until = self.cooldown_until.lock();
        if now < *until {
            log::debug!("Circuit breaker already open; ignoring trip");
            return false;
        }
        *until = now + duration;
        log::warn!(
            "AI quota exhausted. Pausing AI features for {}s",
            duration.as_secs_f64().ceil() as u64
        );
        true
    }

    /// Trip with the configured cooldown.
    pub fn trip_default(&self) -> bool {
        self.trip(self.default_cooldown)
    }

    /// Whole seconds until the breaker closes, rounded up; 0 when closed.
    pub fn remaining_secs(&self) -> u64 {
        let remaining = self
            .cooldown_until
            .lock()
            .saturating_duration_since(Instant::now());
        remaining.as_millis().div_ceil(1000) as u64
    }

    /// User-facing text shown instead of running an AI operation.
    pub fn wait_message(&self) -> String {
        format!(
            "AI is cooling down after hitting its quota. Try again in {}s.",
            self.remaining_secs()
        )
    }
}

impl Default for QuotaCircuitBreaker {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
