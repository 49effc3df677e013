use crate::config::PollingOptions;
use crate::error::ArchiverResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Result of one check-and-advance step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Condition not met yet; check again after the poll interval
    Pending,
    /// Moved to the next state; check again immediately
    Advanced,
    /// Nothing left to do
    Finished,
}

/// A state machine advanced by repeated checks
///
/// `step` never sleeps. Scheduling belongs to whoever calls it, so the same
/// machine runs under [`Poller`], a test loop or any other scheduler.
#[async_trait]
pub trait CheckAndAdvance: Send {
    /// Check the current condition and advance when it holds
    async fn step(&mut self) -> ArchiverResult<StepOutcome>;

    /// The current state has been pending for longer than the timeout
    async fn on_timeout(&mut self, waited: Duration) -> ArchiverResult<()>;
}

/// Drives a [`CheckAndAdvance`] on a timer
#[derive(Debug, Clone, Default)]
pub struct Poller {
    options: PollingOptions,
}

impl Poller {
    /// Poller with the given interval and timeout
    #[must_use]
    pub fn new(options: PollingOptions) -> Self {
        Self { options }
    }

    /// Step until finished or timed out
    ///
    /// The timeout applies per state: every advance restarts the clock.
    ///
    /// # Errors
    /// Whatever `step` or `on_timeout` return
    pub async fn drive<T: CheckAndAdvance + ?Sized>(&self, machine: &mut T) -> ArchiverResult<()> {
        let interval = self.options.step();
        let timeout = self.options.timeout();
        let mut since = Instant::now();

        loop {
            match machine.step().await? {
                StepOutcome::Finished => return Ok(()),
                StepOutcome::Advanced => since = Instant::now(),
                StepOutcome::Pending => {
                    let waited = since.elapsed();
                    if let Some(limit) = timeout {
                        if waited >= limit {
                            tracing::warn!(waited_secs = waited.as_secs(), "Poll timed out");
                            return machine.on_timeout(waited).await;
                        }
                    }
                    sleep(interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pending `pending_for` times per state, `states` states long
    struct Countdown {
        states: usize,
        pending_for: usize,
        pending: usize,
        steps: usize,
        timed_out: Option<Duration>,
    }

    impl Countdown {
        fn new(states: usize, pending_for: usize) -> Self {
            Self {
                states,
                pending_for,
                pending: 0,
                steps: 0,
                timed_out: None,
            }
        }
    }

    #[async_trait]
    impl CheckAndAdvance for Countdown {
        async fn step(&mut self) -> ArchiverResult<StepOutcome> {
            self.steps += 1;
            if self.states == 0 {
                return Ok(StepOutcome::Finished);
            }
            if self.pending < self.pending_for {
                self.pending += 1;
                return Ok(StepOutcome::Pending);
            }
            self.pending = 0;
            self.states -= 1;
            Ok(StepOutcome::Advanced)
        }

        async fn on_timeout(&mut self, waited: Duration) -> ArchiverResult<()> {
            self.timed_out = Some(waited);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_without_timeout() {
        let poller = Poller::new(PollingOptions::new(Duration::from_secs(1), Duration::from_secs(10)));
        let mut machine = Countdown::new(3, 2);
        poller.drive(&mut machine).await.unwrap();
        assert_eq!(machine.timed_out, None);
        assert_eq!(machine.steps, 3 * 3 + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resets_on_advance() {
        // 8s pending per state, 10s timeout: never exceeded within one state
        let poller = Poller::new(PollingOptions::new(Duration::from_secs(1), Duration::from_secs(10)));
        let mut machine = Countdown::new(4, 8);
        poller.drive(&mut machine).await.unwrap();
        assert_eq!(machine.timed_out, None);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_stuck() {
        let poller = Poller::new(PollingOptions::new(Duration::from_secs(2), Duration::from_secs(10)));
        let mut machine = Countdown::new(1, usize::MAX);
        poller.drive(&mut machine).await.unwrap();
        let waited = machine.timed_out.unwrap();
        assert!(waited >= Duration::from_secs(10));
        assert!(waited < Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_forever_ignores_timeout() {
        let poller = Poller::new(PollingOptions::forever(Duration::from_secs(60)));
        let mut machine = Countdown::new(1, 1_000);
        poller.drive(&mut machine).await.unwrap();
        assert_eq!(machine.timed_out, None);
        assert_eq!(machine.states, 0);
    }
}
