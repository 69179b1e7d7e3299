//! Scheduled execution of [`Pipeline::run_once`].

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use chainmigrate_core::error::MigratorError;

use crate::pipeline::{Pipeline, RunOutcome};

pub struct Runner {
    pipeline: Pipeline,
    interval: Duration,
}

impl Runner {
    pub fn new(pipeline: Pipeline, interval: Duration) -> Self {
        // tokio intervals panic on a zero period
        let interval = interval.max(Duration::from_millis(1));
        Self { pipeline, interval }
    }

    /// Tick at the pipeline's configured `poll_interval_secs`.
    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        let interval = pipeline.poll_interval();
        Self::new(pipeline, interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    /// Run ticks every `interval` until `shutdown` resolves or a fatal error.
    ///
    /// Ticks never overlap: a tick that outlasts the interval delays the next
    /// one instead of queueing a burst. A set halt flag is re-checked on each
    /// tick, so clearing it resumes work without a restart. Returns the number
    /// of completed ticks.
    pub async fn run_scheduled<F>(&mut self, shutdown: F) -> Result<u64, MigratorError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut completed = 0u64;
        tracing::info!(interval_secs = self.interval.as_secs(), "starting scheduled runs");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(completed, "shutdown requested, stopping");
                    return Ok(completed);
                }
                _ = ticker.tick() => {}
            }

            match self.pipeline.run_once().await {
                Ok(RunOutcome::Completed(_)) => completed += 1,
                Ok(RunOutcome::Halted) => {}
                Err(e) if e.is_fatal() => return Err(e),
                // Already logged by the pipeline; the next tick retries.
                Err(_) => {}
            }
        }
    }
}
