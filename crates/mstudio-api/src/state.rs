//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use mstudio_media::StyleRegistry;
use mstudio_worker::JobOrchestrator;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: JobOrchestrator,
    pub styles: Arc<StyleRegistry>,
    /// Served under `/videos/`
    pub videos_dir: PathBuf,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        orchestrator: JobOrchestrator,
        styles: Arc<StyleRegistry>,
        videos_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            orchestrator,
            styles,
            videos_dir,
        }
    }
}
