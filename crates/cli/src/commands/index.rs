use lumina_core::retrieval::IndexProgress;
use std::io::Write;
use std::path::PathBuf;

pub async fn run(full: bool, workspace: Option<PathBuf>) -> anyhow::Result<()> {
    let config = super::load_config(workspace)?;
    let workspace = config.workspace_dir();
    let rag = super::open_rag(&config, &workspace).await?;

    let progress = |p: IndexProgress| {
        let file = p.current_file.unwrap_or_default();
        eprint!("\r\x1b[2K[{}/{}] {file}", p.current, p.total);
        let _ = std::io::stderr().flush();
    };

    let report = if full {
        rag.full_index(&progress).await?
    } else {
        rag.incremental_index(&progress).await?
    };
    eprintln!();

    println!(
        "Indexed {} files ({} chunks), removed {} files",
        report.files_indexed, report.chunks_indexed, report.files_removed
    );
    Ok(())
}
