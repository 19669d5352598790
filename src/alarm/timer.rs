use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Repeating job on the tokio runtime, aborted on `cancel` or drop.
///
/// The first run happens one `period` after spawning.
pub struct RepeatTask {
    handle: Option<JoinHandle<()>>,
}

impl RepeatTask {
    pub fn spawn<F>(runtime: &Handle, period: Duration, mut job: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                job();
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Spawn on the ambient runtime, or `None` outside one
    pub fn try_spawn<F>(period: Duration, job: F) -> Option<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Handle::try_current()
            .ok()
            .map(|runtime| Self::spawn(&runtime, period, job))
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for RepeatTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
