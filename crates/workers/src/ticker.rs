//! Timer registrations that feed ticks into a worker mailbox.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::mailbox::WorkerHandle;

/// Owns the timers of one worker. Cancelling or dropping the ticker stops
/// every tick it scheduled.
pub struct Ticker {
    token: CancellationToken,
}

impl Ticker {
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    /// Deliver `requests` one by one, each `interval` after the previous one
    /// and the first one `interval` from now. Resolves to the number of ticks
    /// handed to the mailbox.
    pub fn schedule_sequence<Req, Out>(
        &self,
        interval: Duration,
        handle: WorkerHandle<Req, Out>,
        requests: Vec<Req>,
    ) -> JoinHandle<usize>
    where
        Req: Send + 'static,
        Out: Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            let mut delivered = 0;
            for request in requests {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = time::sleep(interval) => {}
                }
                if handle.try_tick(request) {
                    delivered += 1;
                }
            }
            debug!(role = handle.role(), delivered = delivered, "Tick sequence finished");
            delivered
        })
    }

    /// Every `period`, deliver whatever `requests` produces. Missed periods
    /// are skipped rather than bunched up.
    pub fn schedule_every<Req, Out, F>(
        &self,
        period: Duration,
        handle: WorkerHandle<Req, Out>,
        mut requests: F,
    ) -> JoinHandle<()>
    where
        Req: Send + 'static,
        Out: Send + 'static,
        F: FnMut() -> Vec<Req> + Send + 'static,
    {
        let token = self.token.clone();
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        for request in requests() {
                            handle.try_tick(request);
                        }
                    }
                }
            }
            debug!(role = handle.role(), "Recurring tick cancelled");
        })
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
