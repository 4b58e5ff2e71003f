//! CLI route: single route table and run context. Wires transports into the pipeline.

use crate::cli::output::format_run_output;
use crate::cli::parse::{Cli, Commands};
use crate::config::{ConfigLoader, RebuildConfig};
use crate::dispatch::{MemoryQueue, QueueHttpPublisher, QueuePublisher};
use crate::error::RebuildError;
use crate::logging::LoggingConfig;
use crate::notify::SlackNotifier;
use crate::pipeline::RebuildPipeline;
use crate::source::MemorySource;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Rendered command output and whether the process should exit cleanly.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

/// Runtime context for CLI execution: the loaded configuration.
pub struct RunContext {
    config: RebuildConfig,
}

impl RunContext {
    /// Load configuration from `config_path`, the environment and defaults.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, RebuildError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Ok(Self { config })
    }

    pub fn from_config(config: RebuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RebuildConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<CommandOutput, RebuildError> {
        match command {
            Commands::Run {
                store_id,
                event,
                fixture,
                dry_run,
            } => {
                let payload = invocation_payload(store_id.as_deref(), event.as_deref())?;
                self.handle_run(&payload, fixture, *dry_run).await
            }
            Commands::Config => Ok(CommandOutput {
                text: self.config.to_toml()?,
                success: true,
            }),
        }
    }

    async fn handle_run(
        &self,
        payload: &Value,
        fixture: &Path,
        dry_run: bool,
    ) -> Result<CommandOutput, RebuildError> {
        let source = Arc::new(MemorySource::from_fixture_file(fixture)?);

        let memory_queue = dry_run.then(|| Arc::new(MemoryQueue::new()));
        let publisher: Arc<dyn QueuePublisher> = match &memory_queue {
            Some(queue) => Arc::clone(queue) as Arc<dyn QueuePublisher>,
            None => {
                let queue_url = self.config.dispatch.queue_url.clone().ok_or_else(|| {
                    RebuildError::ConfigError(
                        "dispatch.queue_url is required unless --dry-run is given".to_string(),
                    )
                })?;
                Arc::new(QueueHttpPublisher::new(
                    queue_url,
                    Duration::from_secs(self.config.dispatch.request_timeout_secs),
                )?)
            }
        };

        let mut pipeline = RebuildPipeline::new(source, publisher, &self.config);
        if self.config.notify.enabled && !dry_run {
            match self.config.notify.resolve_token() {
                Some(token) => {
                    let chat = SlackNotifier::new(
                        self.config.notify.api_url.clone(),
                        token,
                        Duration::from_secs(self.config.notify.request_timeout_secs),
                    )?;
                    pipeline = pipeline.with_chat(Arc::new(chat), &self.config);
                }
                None => warn!("Notifications enabled but no chat token configured; skipping"),
            }
        }

        let result = pipeline.handle(payload).await;
        info!(success = result.success, dry_run, "Run finished");
        Ok(CommandOutput {
            text: format_run_output(&result, memory_queue.map(|queue| queue.published()))?,
            success: result.success,
        })
    }
}

/// Payload for `run`: `--store-id` becomes a direct invocation, `--event` is read as-is.
/// With neither, the empty payload is reported as invalid parameters by the pipeline.
pub fn invocation_payload(
    store_id: Option<&str>,
    event: Option<&Path>,
) -> Result<Value, RebuildError> {
    match (store_id, event) {
        (Some(store_id), _) => Ok(json!({ "store_id": store_id })),
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                RebuildError::InvalidParameters(format!("Failed to read event {:?}: {}", path, e))
            })?;
            Ok(serde_json::from_str(&raw)?)
        }
        (None, None) => Ok(json!({})),
    }
}

/// Build logging configuration from CLI args and the loaded config.
/// Precedence: CLI flags override config file override defaults.
pub fn build_logging_config(cli: &Cli, config: Option<&RebuildConfig>) -> LoggingConfig {
    let mut logging = config.map(|c| c.logging.clone()).unwrap_or_default();

    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        logging.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        logging.output = output.clone();
    }
    logging
}
