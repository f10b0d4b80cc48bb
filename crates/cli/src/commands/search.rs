use lumina_core::retrieval::SearchResult;
use std::path::PathBuf;

/// Characters of chunk content shown per hit.
const SNIPPET_CHARS: usize = 200;

pub async fn run(
    query: &str,
    limit: Option<usize>,
    min_score: Option<f32>,
    directory: Option<String>,
    workspace: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = super::load_config(workspace)?;
    let workspace = config.workspace_dir();
    let rag = super::open_rag(&config, &workspace).await?;

    let mut options = rag.default_options();
    if let Some(limit) = limit {
        options.limit = limit;
    }
    if let Some(min_score) = min_score {
        options.min_score = min_score;
    }
    options.directory = directory;

    let results = rag.search(query, &options).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for result in &results {
        println!("{}\n", format_hit(result));
    }
    Ok(())
}

fn format_hit(hit: &SearchResult) -> String {
    let mut header = format!(
        "{:.3}  {}:{}-{}",
        hit.score, hit.file_path, hit.start_line, hit.end_line
    );
    if let Some(heading) = &hit.heading {
        header.push_str(&format!("  [{heading}]"));
    }
    let mut snippet: String = hit.content.chars().take(SNIPPET_CHARS).collect();
    if hit.content.chars().count() > SNIPPET_CHARS {
        snippet.push_str("...");
    }
    format!("{header}\n{}", snippet.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_shows_location_and_heading() {
        let hit = SearchResult {
            file_path: "rust/ownership.md".into(),
            content: "x".repeat(250),
            score: 0.8123,
            heading: Some("Borrowing".into()),
            start_line: 4,
            end_line: 12,
        };
        let text = format_hit(&hit);
        assert!(text.starts_with("0.812  rust/ownership.md:4-12  [Borrowing]\n"));
        assert!(text.ends_with("..."));
    }
}
