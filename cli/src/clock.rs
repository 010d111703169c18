use tokio::{
    task::JoinHandle,
    time::{interval_at, Duration, Instant, MissedTickBehavior},
};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Repeating ticker that lives exactly as long as the guard.
///
/// The first tick fires one full period after `start`. Dropping the guard
/// aborts the task, so every exit path of the owner cancels the timer.
pub struct ClockGuard {
    handle: JoinHandle<()>,
}

impl ClockGuard {
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick();
            }
        });
        Self { handle }
    }
}

impl Drop for ClockGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
