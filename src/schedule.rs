use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// A periodic callback running on the tokio runtime.
///
/// The first call happens one `period` after spawning. The task is aborted
/// when the `Schedule` is dropped, so whoever holds it owns its lifetime.
pub struct Schedule {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Schedule {
    pub fn spawn<F>(name: &'static str, period: Duration, mut f: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let start = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if f().is_break() {
                    debug!("Schedule {} stopped itself", name);
                    break;
                }
            }
        });
        debug!("Schedule {} started, period {:?}", name, period);
        Self { name, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("Schedule {} cancelled", self.name);
        }
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_period_until_dropped() {
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let schedule = Schedule::spawn("test", Duration::from_secs(1), move || {
            c.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(schedule);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn break_ends_the_task() {
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let schedule = Schedule::spawn("test", Duration::from_secs(1), move || {
            if c.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(schedule.is_finished());
    }
}
