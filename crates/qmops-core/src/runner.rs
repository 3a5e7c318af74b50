//! Continuous-mode runner
//!
//! Wraps a component cycle in a fixed-interval loop meant to run under an
//! external supervisor. A failing cycle is logged and the loop keeps going;
//! the loop ends on Ctrl+C, or after `max_cycles` so the supervisor can start a
//! fresh process.

use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

use crate::Result;

/// Why a continuous run returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Interrupted by Ctrl+C
    Interrupted,
    /// Reached the configured cycle budget
    CycleLimit,
}

/// Outcome of a continuous run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub stop_reason: StopReason,
}

/// Loop parameters
#[derive(Debug, Clone)]
pub struct Runner {
    name: String,
    interval: Duration,
    max_cycles: Option<u64>,
}

impl Runner {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            max_cycles: None,
        }
    }

    /// Stop after this many cycles (supervisor-driven restarts)
    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Run `cycle` immediately and then once per interval
    pub async fn run<F, Fut, T>(&self, mut cycle: F) -> RunSummary
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        info!(
            "{} running continuously every {}s",
            self.name,
            self.interval.as_secs()
        );

        let mut cycles = 0u64;
        let mut failed_cycles = 0u64;

        loop {
            cycles += 1;
            if let Err(e) = cycle(cycles).await {
                failed_cycles += 1;
                error!("{} cycle {} failed: {}", self.name, cycles, e);
            }

            if self.max_cycles.is_some_and(|max| cycles >= max) {
                info!(
                    "{} reached {} cycles, exiting for supervisor restart",
                    self.name, cycles
                );
                return RunSummary {
                    cycles,
                    failed_cycles,
                    stop_reason: StopReason::CycleLimit,
                };
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("{} interrupted, shutting down", self.name);
                    return RunSummary {
                        cycles,
                        failed_cycles,
                        stop_reason: StopReason::Interrupted,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QmopsError;

    #[tokio::test]
    async fn test_runner_stops_at_cycle_limit() {
        let runner = Runner::new("test", Duration::from_millis(1)).with_max_cycles(Some(3));
        let summary = runner.run(|_| async { Ok::<_, QmopsError>(()) }).await;

        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.failed_cycles, 0);
        assert_eq!(summary.stop_reason, StopReason::CycleLimit);
    }

    #[tokio::test]
    async fn test_failed_cycles_do_not_stop_the_loop() {
        let runner = Runner::new("test", Duration::from_millis(1)).with_max_cycles(Some(4));
        let summary = runner
            .run(|n| async move {
                if n % 2 == 0 {
                    Err(QmopsError::Other("flaky".to_string()))
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(summary.cycles, 4);
        assert_eq!(summary.failed_cycles, 2);
    }
}
