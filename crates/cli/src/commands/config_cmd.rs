use anyhow::Context;
use lumina_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    println!("{}", redacted_toml(&config)?);
    Ok(())
}

/// Serialize `config` with every API key replaced.
fn redacted_toml(config: &AppConfig) -> anyhow::Result<String> {
    let mut config = config.clone();
    let hide = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some(REDACTED.to_string());
        }
    };
    hide(&mut config.provider.api_key);
    hide(&mut config.rag.embedding.api_key);
    hide(&mut config.rag.reranker.api_key);
    toml::to_string_pretty(&config).context("failed to serialize configuration")
}
