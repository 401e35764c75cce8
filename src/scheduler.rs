use std::time::Duration;

use crate::engine::SnapshotEngine;
use crate::fetcher::ContentFetcher;
use crate::namer::Clock;

/// Runs snapshot cycles one after another, sleeping `interval` in between.
///
/// A failed cycle never stops the loop. It ends after `max_cycles` cycles (if
/// set) or when Ctrl-C arrives during the sleep.
pub struct Scheduler<F, C> {
    engine: SnapshotEngine<F, C>,
    interval: Duration,
    max_cycles: Option<u64>,
}

impl<F, C> Scheduler<F, C>
where
    F: ContentFetcher,
    C: Clock,
{
    pub fn new(engine: SnapshotEngine<F, C>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn engine(&self) -> &SnapshotEngine<F, C> {
        &self.engine
    }

    /// Returns the number of cycles run.
    pub async fn run(&mut self) -> u64 {
        loop {
            let report = self.engine.run_cycle().await;
            tracing::debug!(
                timestamp = %report.timestamp,
                success = report.is_success(),
                "cycle finished"
            );

            if self
                .max_cycles
                .is_some_and(|max| self.engine.cycles_run() >= max)
            {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, stopping");
                    break;
                }
            }
        }

        self.engine.cycles_run()
    }
}
