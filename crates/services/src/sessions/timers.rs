use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Completion signals delivered to the controller's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Audio finished and the settle delay elapsed for the reveal step `epoch`.
    Settled { epoch: u64 },
    /// One elapsed-time interval passed.
    Tick,
}

/// A spawned task that is aborted when the handle is dropped.
#[derive(Debug)]
pub(crate) struct PendingTimer(JoinHandle<()>);

impl PendingTimer {
    pub(crate) fn spawn(task: impl Future<Output = ()> + Send + 'static) -> Self {
        Self(tokio::spawn(task))
    }

    /// Periodic `Signal::Tick`, first one after a full `period`.
    pub(crate) fn ticker(period: Duration, signals: UnboundedSender<Signal>) -> Self {
        Self::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if signals.send(Signal::Tick).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}
