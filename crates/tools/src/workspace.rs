//! Workspace sandboxing and note discovery shared by the note tools.
//!
//! Every path a tool receives is relative to the workspace root. Absolute
//! paths, `..` components and symlinks that resolve outside the root are
//! rejected with [`ToolError::PathOutsideWorkspace`]. The private data
//! directory is invisible to tools.

use lumina_core::error::ToolError;
use lumina_core::tool::ToolContext;
use lumina_rag::DATA_DIR;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A markdown note found in the workspace.
#[derive(Debug, Clone)]
pub struct NoteEntry {
    /// Workspace-relative, `/`-separated
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Resolve a workspace-relative path to an absolute one.
///
/// The target does not need to exist. When it (or its parent) does, the
/// canonical location must still be inside the workspace.
pub fn resolve(ctx: &ToolContext, path: &str) -> Result<PathBuf, ToolError> {
    let normalized = path.trim().replace('\\', "/");
    let relative = Path::new(&normalized);
    let outside = || ToolError::PathOutsideWorkspace(path.to_string());

    if relative.is_absolute() || normalized.starts_with('/') {
        return Err(outside());
    }

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(outside());
            }
        }
    }
    if clean.components().next().is_some_and(|c| c.as_os_str() == DATA_DIR) {
        return Err(outside());
    }

    let full = ctx.workspace_path.join(&clean);

    // Symlinks may point anywhere; check where the path really lands
    let existing = if full.exists() {
        Some(full.clone())
    } else {
        full.parent().filter(|p| p.exists()).map(Path::to_path_buf)
    };
    if let Some(existing) = existing
        && let (Ok(real), Ok(root)) = (existing.canonicalize(), ctx.workspace_path.canonicalize())
        && !real.starts_with(&root)
    {
        return Err(outside());
    }

    Ok(full)
}

/// Workspace-relative, `/`-separated form of `abs`.
pub fn relative(root: &Path, abs: &Path) -> String {
    abs.strip_prefix(root)
        .unwrap_or(abs)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Every non-hidden `.md` file under `dir`, sorted by relative path.
///
/// `root` is the workspace root that relative paths are computed against.
pub async fn markdown_files(root: &Path, dir: &Path) -> Result<Vec<NoteEntry>, ToolError> {
    let root = root.to_path_buf();
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut notes: Vec<NoteEntry> = WalkDir::new(&dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "md"))
            .map(|e| NoteEntry {
                rel_path: relative(&root, e.path()),
                abs_path: e.into_path(),
            })
            .collect();
        notes.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        notes
    })
    .await
    .map_err(|e| ToolError::InvalidArguments(format!("workspace scan failed: {e}")))
}

/// Flat `key: value` pairs from a leading `---` frontmatter block.
pub fn parse_frontmatter(content: &str) -> Option<BTreeMap<String, String>> {
    let rest = content.trim_start().strip_prefix("---")?;
    let end = rest.find("\n---")?;

    let mut fields = BTreeMap::new();
    for line in rest[..end].lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            fields.insert(key.trim().to_string(), value.to_string());
        }
    }
    Some(fields)
}
