//! Timing jitter for intercepted calls.
//!
//! Replacements add a small random delay and a random amount of busy work
//! so their latency does not stand out from the native call. All draws
//! come from the context's shared stream. An inactive instance (no
//! generator yet) does nothing.

use std::future::Future;
use std::hint::black_box;
use std::time::Duration;

use web_time::Instant;

use super::prng::SharedPrng;

/// Upper bound (exclusive) of the async delay, in milliseconds.
pub const MAX_ASYNC_DELAY_MS: f64 = 5.0;
/// Upper bound (exclusive) of the busy-wait delay, in milliseconds.
pub const MAX_SYNC_DELAY_MS: f64 = 2.0;
/// Busy-wait delays at or below this are skipped.
pub const MIN_SYNC_DELAY_MS: f64 = 0.5;
/// Upper bound (exclusive) of jitter iterations.
pub const MAX_JITTER_ITERATIONS: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct TimingUtils {
    prng: Option<SharedPrng>,
}

impl TimingUtils {
    pub fn new(prng: SharedPrng) -> Self {
        Self { prng: Some(prng) }
    }

    /// Timing utilities before bootstrap: every operation is a no-op.
    pub fn inactive() -> Self {
        Self { prng: None }
    }

    pub fn is_active(&self) -> bool {
        self.prng.is_some()
    }

    /// Draw the next async delay: `floor(draw * 5)` ms.
    pub fn next_delay_ms(&self) -> Option<u32> {
        self.prng
            .as_ref()
            .map(|prng| (prng.draw() * MAX_ASYNC_DELAY_MS) as u32)
    }

    /// Sleep 0-4 ms. Zero-length delays do not yield.
    pub async fn random_delay(&self) {
        match self.next_delay_ms() {
            Some(ms) if ms > 0 => sleep_ms(ms).await,
            _ => {}
        }
    }

    /// Busy-wait up to 2 ms. Draws at or below 0.5 ms return immediately.
    pub fn random_delay_sync(&self) {
        let Some(prng) = &self.prng else {
            return;
        };
        let delay_ms = prng.draw() * MAX_SYNC_DELAY_MS;
        if delay_ms > MIN_SYNC_DELAY_MS {
            let budget = Duration::from_secs_f64(delay_ms / 1000.0);
            let start = Instant::now();
            while start.elapsed() < budget {
                std::hint::spin_loop();
            }
        }
    }

    /// Run 0-9 iterations of throwaway arithmetic and return the result.
    pub fn execution_jitter(&self) -> f64 {
        let Some(prng) = &self.prng else {
            return 0.0;
        };
        let iterations = (prng.draw() * MAX_JITTER_ITERATIONS) as u32;
        let mut dummy = 0.0f64;
        for i in 0..iterations {
            dummy += black_box(f64::from(i + 1)).sqrt();
        }
        black_box(dummy)
    }

    /// Busy-wait, jitter, then run `f`.
    pub fn guard<T>(&self, f: impl FnOnce() -> T) -> T {
        self.random_delay_sync();
        self.execution_jitter();
        f()
    }

    /// Delay, jitter, await `fut`, then delay again.
    pub async fn guard_async<F: Future>(&self, fut: F) -> F::Output {
        self.random_delay().await;
        self.execution_jitter();
        let output = fut.await;
        self.random_delay().await;
        output
    }
}

#[cfg(target_arch = "wasm32")]
async fn sleep_ms(ms: u32) {
    gloo_timers::future::TimeoutFuture::new(ms).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_ms(ms: u32) {
    std::thread::sleep(Duration::from_millis(u64::from(ms)));
}
