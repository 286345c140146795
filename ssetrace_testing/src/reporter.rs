//! A [`Reporter`] that keeps every report for later assertions.

use std::{
    pin::pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use ssetrace::{LifecycleReport, Reporter};
use tokio::{sync::Notify, time::Instant};

#[derive(Debug, Default)]
struct Shared {
    reports: Mutex<Vec<LifecycleReport>>,
    arrived: Notify,
}

/// Collects lifecycle reports; clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    shared: Arc<Shared>,
}

impl RecordingReporter {
    /// Snapshot of the reports received so far, in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if the store lock is poisoned.
    #[must_use]
    pub fn reports(&self) -> Vec<LifecycleReport> {
        self.shared.reports.lock().expect("reports poisoned").clone()
    }

    #[must_use]
    pub fn len(&self) -> usize { self.shared.reports.lock().expect("reports poisoned").len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Wait until at least `count` reports have arrived or `limit` elapses.
    ///
    /// Returns the reports received by then, which may be fewer than
    /// `count` on timeout.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<LifecycleReport> {
        let deadline = Instant::now() + limit;
        loop {
            let mut arrived = pin!(self.shared.arrived.notified());
            arrived.as_mut().enable();
            if self.len() >= count {
                break;
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                break;
            }
        }
        self.reports()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, report: &LifecycleReport) {
        if let Ok(mut reports) = self.shared.reports.lock() {
            reports.push(report.clone());
        }
        self.shared.arrived.notify_waiters();
    }
}
