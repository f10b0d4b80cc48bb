pub mod config_cmd;
pub mod index;
pub mod init;
pub mod run;
pub mod search;
pub mod status;

use anyhow::Context;
use lumina_config::AppConfig;
use lumina_rag::RagManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load the config, letting `--workspace` override the configured one.
pub fn load_config(workspace: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load().context("failed to load configuration")?;
    if workspace.is_some() {
        config.workspace = workspace;
    }
    Ok(config)
}

/// Build the retrieval manager and open the workspace index.
pub async fn open_rag(config: &AppConfig, workspace: &Path) -> anyhow::Result<Arc<RagManager>> {
    let rag = RagManager::from_config(&config.rag, &config.provider)
        .context("failed to set up retrieval")?;
    rag.initialize(workspace)
        .await
        .with_context(|| format!("failed to open index in {}", workspace.display()))?;
    Ok(Arc::new(rag))
}
