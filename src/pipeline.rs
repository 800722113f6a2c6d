use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, ConfigStore, ResolvedConfig, SettingsReason};
use crate::download::{DownloadError, Downloader};
use crate::extract::{DocumentLoader, ExtractionError, ExtractionWorker};
use crate::filename::{build_prompt, normalize_filename};
use crate::generate::{GenerationError, TextGenerator};
use crate::relay::{request_extraction, MessageBus, WorkerHost, EXTRACTION_TIMEOUT};
use crate::status::StatusReporter;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("PDF text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("filename generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("the model returned an empty filename")]
    EmptyFilename,

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
}

/// Result of one trigger.
#[derive(Debug)]
pub enum RunOutcome {
    Completed { filename: String, saved_to: PathBuf },
    /// No API key; the caller should open the settings surface.
    NeedsConfiguration(SettingsReason),
    Failed(PipelineError),
    /// Nothing to work on; no status was shown.
    Aborted,
}

/// Sequences extraction, generation and download for each trigger.
///
/// Triggers are independent: concurrent runs are allowed, each with its own
/// run id on the status stream and its own correlation id on the bus.
pub struct Orchestrator {
    store: ConfigStore,
    api_key_override: Option<String>,
    bus: MessageBus,
    host: WorkerHost,
    generator: Arc<dyn TextGenerator>,
    downloader: Arc<dyn Downloader>,
    status: StatusReporter,
}

impl Orchestrator {
    pub fn new(
        store: ConfigStore,
        loader: Arc<dyn DocumentLoader>,
        generator: Arc<dyn TextGenerator>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let bus = MessageBus::new();
        let worker = Arc::new(ExtractionWorker::new(loader));
        let host = WorkerHost::for_worker(bus.clone(), worker);

        Self {
            store,
            api_key_override: None,
            bus,
            host,
            generator,
            downloader,
            status: StatusReporter::new(),
        }
    }

    pub fn with_api_key_override(mut self, api_key: Option<String>) -> Self {
        self.api_key_override = api_key;
        self
    }

    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = status;
        self
    }

    #[cfg(test)]
    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub async fn trigger(&self, locator: Option<&str>) -> RunOutcome {
        let Some(locator) = locator.map(str::trim).filter(|l| !l.is_empty()) else {
            error!("No resource locator for the active document");
            return RunOutcome::Aborted;
        };

        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, url = %locator, "Starting rename pipeline");
        self.status.busy(run_id);

        let config = match self.load_config() {
            Ok(config) => config,
            Err(e) => return self.fail(run_id, e),
        };

        let Some(api_key) = config.api_key.as_deref() else {
            warn!(run_id = %run_id, "API key is not configured; opening settings");
            self.status.clear(run_id);
            return RunOutcome::NeedsConfiguration(SettingsReason::NoApiKey);
        };

        match self.run(locator, api_key, &config).await {
            Ok((filename, saved_to)) => {
                info!(run_id = %run_id, filename = %filename, path = %saved_to.display(), "Rename pipeline completed");
                self.status.success(run_id);
                RunOutcome::Completed { filename, saved_to }
            }
            Err(e) => self.fail(run_id, e),
        }
    }

    fn load_config(&self) -> Result<ResolvedConfig, PipelineError> {
        let settings = self.store.load()?;
        Ok(settings.resolve(self.api_key_override.as_deref()))
    }

    async fn run(
        &self,
        locator: &str,
        api_key: &str,
        config: &ResolvedConfig,
    ) -> Result<(String, PathBuf), PipelineError> {
        self.host.ensure().await?;

        let text = request_extraction(
            &self.bus,
            locator,
            config.page_count,
            EXTRACTION_TIMEOUT,
        )
        .await?;
        info!(pages = config.page_count.get(), chars = text.len(), "PDF text extracted; generating filename");

        let prompt = build_prompt(&config.system_prompt, &text);
        let generated = self.generator.generate(api_key, &prompt).await?;

        let filename = normalize_filename(&generated).ok_or(PipelineError::EmptyFilename)?;
        info!(filename = %filename, "Final filename");

        let saved_to = self.downloader.download(locator, &filename).await?;
        Ok((filename, saved_to))
    }

    fn fail(&self, run_id: Uuid, e: PipelineError) -> RunOutcome {
        error!(run_id = %run_id, error = %e, "Rename pipeline failed");
        self.status.error(run_id);
        RunOutcome::Failed(e)
    }
}
