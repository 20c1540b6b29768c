//! Render completion polling.
//!
//! The remote renderer only answers status queries, so completion is
//! observed by asking repeatedly. A fatal error reported at any point ends
//! the wait immediately, including after progress has already been seen.

use std::time::Duration;

use tokio::time::Instant;

use mstudio_models::{OutputLocation, RenderHandle};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::remote::RenderDispatcher;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Wait before each status query
    pub interval: Duration,
    /// `None` waits as long as the renderer keeps reporting progress
    pub max_wait: Option<Duration>,
}

/// Result of one poll round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Still running; the percentage changed since the previous round
    Progressed(u8),
    /// Still running, nothing new
    Pending,
    Finished(OutputLocation),
}

pub struct RenderPoller<'a> {
    dispatcher: &'a dyn RenderDispatcher,
    handle: &'a RenderHandle,
    settings: PollSettings,
    started: Instant,
    last_percent: Option<u8>,
}

impl<'a> RenderPoller<'a> {
    pub fn new(
        dispatcher: &'a dyn RenderDispatcher,
        handle: &'a RenderHandle,
        settings: PollSettings,
    ) -> Self {
        Self {
            dispatcher,
            handle,
            settings,
            started: Instant::now(),
            last_percent: None,
        }
    }

    /// Sleep one interval, then query the renderer once.
    pub async fn next(&mut self) -> WorkerResult<PollOutcome> {
        tokio::time::sleep(self.settings.interval).await;

        if let Some(max_wait) = self.settings.max_wait {
            if self.started.elapsed() >= max_wait {
                return Err(WorkerError::RenderTimeout(max_wait.as_secs()));
            }
        }

        metrics::record_render_poll();
        let progress = self.dispatcher.progress(self.handle).await?;

        if let Some(message) = progress.fatal_error {
            return Err(WorkerError::render(message));
        }

        if progress.done {
            return progress.output.map(PollOutcome::Finished).ok_or_else(|| {
                WorkerError::render("render finished without an output location")
            });
        }

        let percent = progress.overall_progress.clamp(0.0, 1.0);
        let percent = (percent * 100.0).round() as u8;
        if self.last_percent == Some(percent) {
            return Ok(PollOutcome::Pending);
        }
        self.last_percent = Some(percent);
        Ok(PollOutcome::Progressed(percent))
    }
}
