use anyhow::Context;
use lumina_config::AppConfig;

pub async fn run(force: bool) -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("failed to create {}", config_dir.display()))?;
    tokio::fs::write(&config_path, AppConfig::default_toml())
        .await
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!("Wrote {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set your API key: export LUMINA_API_KEY=\"sk-...\"");
    println!("  2. Index your notes: lumina index --workspace ~/notes");
    println!("  3. Run a task:       lumina run \"summarise today's note\"");
    Ok(())
}
