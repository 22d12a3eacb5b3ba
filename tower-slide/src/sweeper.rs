use std::sync::Arc;
use std::time::Duration;

use slide_limit::Admission;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Stops the sweeper task when stopped or dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Periodically drops counters whose keys have been idle for a full window.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(admission: Arc<Admission>, every: Duration) -> SweeperHandle {
    let every = every.max(MIN_SWEEP_INTERVAL);
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let purged = admission.purge_expired();
            tracing::trace!(purged, "sweep tick");
        }
    });
    SweeperHandle { task }
}
