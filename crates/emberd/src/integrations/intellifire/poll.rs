use std::time::Duration;

use tokio::time::Instant;

/// Polling mode for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    /// Repeat every interval. A zero interval means the cached state is never
    /// trusted: the schedule is permanently due and every read is live.
    Every(Duration),

    /// Infinite cache: never fire automatically. State only changes through
    /// explicit refresh requests or pushed notifications.
    Never,
}

impl PollInterval {
    pub fn from_config(interval: Option<Duration>) -> Self {
        match interval {
            Some(d) => PollInterval::Every(d),
            None => PollInterval::Never,
        }
    }
}

/// A debounced, resettable repeating timer, one per device.
///
/// `tick()` resolves when the deadline is reached and re-arms for the next
/// interval. `reset()` pushes the deadline out to a full interval from now;
/// it is called on every manual get/set and on every pushed state update so a
/// just-completed manual operation is not followed by a near-duplicate
/// automatic query. This is a debounce, not a cancel: an interval that passes
/// undisturbed still fires.
///
/// The schedule stops only when its owning device unit is dropped.
#[derive(Debug)]
pub struct PollSchedule {
    interval: PollInterval,
    deadline: Instant,
}

impl PollSchedule {
    pub fn new(interval: PollInterval) -> Self {
        let mut schedule = Self {
            interval,
            deadline: Instant::now(),
        };
        schedule.reset();
        schedule
    }

    /// Restart the countdown to a full interval from now.
    pub fn reset(&mut self) {
        if let PollInterval::Every(interval) = self.interval {
            self.deadline = Instant::now() + interval;
        }
    }

    /// Wait until the next automatic tick is due.
    ///
    /// Cancel-safe: dropping the future before the deadline leaves the
    /// deadline unchanged, so a select loop can race it against other events.
    pub async fn tick(&mut self) {
        match self.interval {
            PollInterval::Never => std::future::pending::<()>().await,
            PollInterval::Every(_) => {
                tokio::time::sleep_until(self.deadline).await;
                self.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_tick_fires_at_interval() {
        let mut schedule = PollSchedule::new(PollInterval::Every(INTERVAL));

        let start = Instant::now();
        schedule.tick().await;
        assert_eq!(start.elapsed(), INTERVAL);

        // Undisturbed, the next tick fires one interval later.
        schedule.tick().await;
        assert_eq!(start.elapsed(), 2 * INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_delays_next_tick() {
        let mut schedule = PollSchedule::new(PollInterval::Every(INTERVAL));

        tokio::time::advance(Duration::from_secs(30)).await;
        let reset_at = Instant::now();
        schedule.reset();

        schedule.tick().await;
        assert_eq!(reset_at.elapsed(), INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let mut schedule = PollSchedule::new(PollInterval::Never);

        tokio::select! {
            _ = schedule.tick() => panic!("infinite cache schedule must never tick"),
            _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_always_due() {
        let mut schedule = PollSchedule::new(PollInterval::Every(Duration::ZERO));

        let start = Instant::now();
        schedule.tick().await;
        schedule.reset();
        schedule.tick().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_tick_keeps_deadline() {
        let mut schedule = PollSchedule::new(PollInterval::Every(INTERVAL));
        let start = Instant::now();

        // Race the tick against a shorter sleep, as the unit loop does.
        tokio::select! {
            _ = schedule.tick() => panic!("tick fired early"),
            _ = tokio::time::sleep(Duration::from_secs(10)) => {}
        }

        schedule.tick().await;
        assert_eq!(start.elapsed(), INTERVAL);
    }
}
