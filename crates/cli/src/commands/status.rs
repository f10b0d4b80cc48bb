use lumina_config::AppConfig;
use std::path::PathBuf;

pub async fn run(workspace: Option<PathBuf>) -> anyhow::Result<()> {
    let config = super::load_config(workspace)?;
    let workspace = config.workspace_dir();

    println!("Lumina status");
    println!("  Config dir:  {}", AppConfig::config_dir().display());
    println!("  Workspace:   {}", workspace.display());
    println!("  Provider:    {} ({})", config.provider.name, config.provider.model);
    println!(
        "  API key:     {}",
        if config.has_api_key() { "set" } else { "missing" }
    );
    println!("  Agent mode:  {:?}", config.agent.mode);
    println!("  Max steps:   {}", config.agent.max_steps);

    if !config.rag.enabled {
        println!("  Retrieval:   disabled");
        return Ok(());
    }

    match super::open_rag(&config, &workspace).await {
        Ok(rag) => {
            let status = rag.status().await?;
            println!(
                "  Retrieval:   {} files, {} chunks{}",
                status.total_files,
                status.total_chunks,
                if status.is_indexing { " (indexing)" } else { "" }
            );
        }
        Err(e) => println!("  Retrieval:   unavailable ({e:#})"),
    }
    Ok(())
}
