//! CLI subcommands.

pub mod batch;
pub mod config;
pub mod process;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use nfagent_core::agent::OpenAiChat;
use nfagent_core::{AgentConfig, Orchestrator, Toolbox};

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nfagent")
        .join("config.json")
}

/// Load the explicit config file, else the default one if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<AgentConfig> {
    if let Some(path) = config_path {
        return AgentConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to read config {}", path));
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config {}", default_path.display());
        Ok(AgentConfig::from_file(&default_path)?)
    } else {
        Ok(AgentConfig::default())
    }
}

/// Orchestrator backed by the configured OpenAI-compatible model.
pub fn build_orchestrator(config: &AgentConfig) -> anyhow::Result<Orchestrator> {
    let model = OpenAiChat::from_config(&config.llm)?;
    let orchestrator = Orchestrator::new(
        Arc::new(model),
        Toolbox::from_config(config),
        config.agent.clone(),
    )?;
    Ok(orchestrator)
}
