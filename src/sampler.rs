//! Periodic sampling of a pool into its recorder set.
//!
//! Each tracked pool gets one tokio task that ticks at a fixed interval,
//! inspects the pool and writes the four gauges. The task is stopped through a
//! [`SamplerHandle`]; cancellation is checked both before inspecting and
//! before writing, so a tick that was already due when `cancel()` ran never
//! touches the recorders.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::inspector::PoolHandle;
use crate::recorder::PoolRecorders;

/// Cancellable token for a running sampler.
///
/// Cancelling is idempotent and safe to call concurrently with an in-flight
/// tick. Dropping the handle cancels the sampler as well.
#[derive(Debug)]
pub struct SamplerHandle {
    token: CancellationToken,
}

impl SamplerHandle {
    /// Stop future ticks. A tick already past its final cancellation check
    /// completes normally.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Fixed-interval sampler bound to one pool and one recorder set.
pub struct PeriodicSampler {
    pool: PoolHandle,
    recorders: Arc<PoolRecorders>,
    token: CancellationToken,
}

impl PeriodicSampler {
    fn new(pool: PoolHandle, recorders: Arc<PoolRecorders>, token: CancellationToken) -> Self {
        Self {
            pool,
            recorders,
            token,
        }
    }

    /// Start sampling `pool` into `recorders` every `interval` on `runtime`.
    ///
    /// The first tick fires immediately. `interval` must be non-zero; the
    /// builder validates this before any sampler is started.
    pub fn spawn(
        runtime: &tokio::runtime::Handle,
        interval: Duration,
        pool: PoolHandle,
        recorders: Arc<PoolRecorders>,
    ) -> SamplerHandle {
        let token = CancellationToken::new();
        let sampler = Self::new(pool, recorders, token.clone());
        runtime.spawn(sampler.run(interval));
        SamplerHandle { token }
    }

    async fn run(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(pool = ?self.pool, ?period, "sampler started");

        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => break,

                _ = ticker.tick() => {
                    if !self.sample_once() {
                        break;
                    }
                }
            }
        }

        debug!(pool = ?self.pool, "sampler stopped");
    }

    /// Run one tick. Returns `false` once the sampler has been cancelled.
    pub(crate) fn sample_once(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let measurement = self.pool.inspect();
        if self.token.is_cancelled() {
            return false;
        }
        self.recorders.record(&measurement);
        true
    }
}
