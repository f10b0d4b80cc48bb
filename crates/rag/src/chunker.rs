//! Heading-aware markdown chunking.
//!
//! A note is split into sections at markdown headings (ignoring headings
//! inside fenced code blocks). Sections smaller than `min_tokens` are merged
//! forward, and sections larger than `max_tokens` are cut into line windows
//! that overlap by roughly `overlap_tokens`. Every chunk keeps the 1-based
//! line range it came from, frontmatter included in the numbering.
//!
//! Chunking is a pure function of its input: the same text always yields the
//! same boundaries.

use lumina_config::ChunkingConfig;
use lumina_core::retrieval::Chunk;

type Line<'a> = (usize, &'a str);

/// Approximate token count: whitespace-separated words, with each CJK
/// character counted on its own.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace()
        .map(|word| word.chars().filter(|c| is_cjk(*c)).count().max(1))
        .sum()
}

pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF     // kana
        | 0x3400..=0x4DBF   // CJK extension A
        | 0x4E00..=0x9FFF   // CJK unified
        | 0xAC00..=0xD7AF   // hangul
        | 0xF900..=0xFAFF)
}

#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    max_tokens: usize,
    min_tokens: usize,
    overlap_tokens: usize,
}

struct Section<'a> {
    heading: Option<String>,
    lines: Vec<Line<'a>>,
}

impl MarkdownChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        let max_tokens = config.max_tokens.max(1);
        Self {
            max_tokens,
            min_tokens: config.min_tokens,
            overlap_tokens: config.overlap_tokens.min(max_tokens - 1),
        }
    }

    /// Split one note into chunks.
    pub fn chunk(&self, content: &str, file_path: &str, modified_at: i64) -> Vec<Chunk> {
        let lines: Vec<Line<'_>> = content.lines().enumerate().map(|(i, l)| (i + 1, l)).collect();
        let body = &lines[frontmatter_len(&lines)..];

        let mut chunks = Vec::new();
        for section in self.merge_tiny(split_sections(body)) {
            for window in self.windows(&section.lines) {
                if let Some(chunk) = make_chunk(window, section.heading.as_deref(), file_path, modified_at) {
                    chunks.push(chunk);
                }
            }
        }
        chunks
    }

    fn merge_tiny<'a>(&self, sections: Vec<Section<'a>>) -> Vec<Section<'a>> {
        let mut merged: Vec<Section<'a>> = Vec::with_capacity(sections.len());
        for section in sections {
            if let Some(last) = merged.last_mut() {
                let last_tokens = line_tokens(&last.lines);
                if last_tokens < self.min_tokens
                    && last_tokens + line_tokens(&section.lines) <= self.max_tokens
                {
                    if last.heading.is_none() {
                        last.heading = section.heading;
                    }
                    last.lines.extend(section.lines);
                    continue;
                }
            }
            merged.push(section);
        }
        merged
    }

    /// Cut a section into windows of at most `max_tokens`, overlapping by
    /// whole lines. A single line longer than the limit becomes its own window.
    fn windows<'s, 'a>(&self, lines: &'s [Line<'a>]) -> Vec<&'s [Line<'a>]> {
        if line_tokens(lines) <= self.max_tokens {
            return vec![lines];
        }

        let mut out = Vec::new();
        let mut start = 0;
        while start < lines.len() {
            let mut end = start;
            let mut tokens = 0;
            while end < lines.len() {
                let t = count_tokens(lines[end].1);
                if end > start && tokens + t > self.max_tokens {
                    break;
                }
                tokens += t;
                end += 1;
            }
            out.push(&lines[start..end]);
            if end >= lines.len() {
                break;
            }

            let mut next = end;
            let mut overlap = 0;
            while next > start + 1 {
                let t = count_tokens(lines[next - 1].1);
                if overlap + t > self.overlap_tokens {
                    break;
                }
                overlap += t;
                next -= 1;
            }
            // Overlap that leaves no room for the next line would stall.
            if overlap + count_tokens(lines[end].1) > self.max_tokens {
                next = end;
            }
            start = next;
        }
        out
    }
}

/// Number of leading lines taken by a `---` frontmatter block.
fn frontmatter_len(lines: &[Line<'_>]) -> usize {
    if lines.first().map(|(_, l)| l.trim_end()) != Some("---") {
        return 0;
    }
    lines[1..]
        .iter()
        .position(|(_, l)| l.trim_end() == "---")
        .map(|i| i + 2)
        .unwrap_or(0)
}

fn split_sections<'a>(lines: &[Line<'a>]) -> Vec<Section<'a>> {
    let mut sections = Vec::new();
    let mut current = Section {
        heading: None,
        lines: Vec::new(),
    };
    let mut in_fence = false;

    for &(no, line) in lines {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if !in_fence && let Some(heading) = heading_text(line) {
            if !current.lines.is_empty() {
                sections.push(current);
            }
            current = Section {
                heading: Some(heading),
                lines: Vec::new(),
            };
        }
        current.lines.push((no, line));
    }

    if !current.lines.is_empty() {
        sections.push(current);
    }
    sections
}

fn heading_text(line: &str) -> Option<String> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) || !line[hashes..].starts_with(' ') {
        return None;
    }
    let text = line[hashes..].trim().trim_end_matches('#').trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn line_tokens(lines: &[Line<'_>]) -> usize {
    lines.iter().map(|(_, l)| count_tokens(l)).sum()
}

fn make_chunk(
    window: &[Line<'_>],
    heading: Option<&str>,
    file_path: &str,
    modified_at: i64,
) -> Option<Chunk> {
    let first = window.iter().position(|(_, l)| !l.trim().is_empty())?;
    let last = window.iter().rposition(|(_, l)| !l.trim().is_empty())?;
    let kept = &window[first..=last];

    Some(Chunk {
        file_path: file_path.to_string(),
        content: kept.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n"),
        heading: heading.map(String::from),
        start_line: kept[0].0,
        end_line: kept[kept.len() - 1].0,
        modified_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, min: usize, overlap: usize) -> MarkdownChunker {
        MarkdownChunker::new(&ChunkingConfig {
            max_tokens: max,
            min_tokens: min,
            overlap_tokens: overlap,
        })
    }

    #[test]
    fn splits_at_headings_with_line_ranges() {
        let text = "# Rust\nOwnership and borrowing.\n\n## Tokio\nAsync runtime notes.\n";
        let chunks = chunker(500, 1, 0).chunk(text, "tech.md", 42);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading.as_deref(), Some("Rust"));
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
        assert_eq!(chunks[1].heading.as_deref(), Some("Tokio"));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (4, 5));
        assert!(chunks[1].content.starts_with("## Tokio"));
        assert_eq!(chunks[1].modified_at, 42);
        assert_eq!(chunks[1].file_path, "tech.md");
    }

    #[test]
    fn headings_inside_code_fences_are_ignored() {
        let text = "# Script\nRun this:\n```bash\n# not a heading\necho hi\n```\nDone.";
        let chunks = chunker(500, 1, 0).chunk(text, "a.md", 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("# not a heading"));
        assert_eq!(chunks[0].end_line, 7);
    }

    #[test]
    fn frontmatter_is_skipped_but_counted() {
        let text = "---\ntitle: Daily\ntags: [log]\n---\n# Monday\nWrote the chunker.";
        let chunks = chunker(500, 1, 0).chunk(text, "daily.md", 0);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].content.contains("title:"));
        assert_eq!(chunks[0].start_line, 5);
        assert_eq!(chunks[0].end_line, 6);
    }

    #[test]
    fn tiny_sections_merge_forward() {
        let text = "# Title\n## Intro\nSome words here to make a body that counts.";
        let chunks = chunker(500, 5, 0).chunk(text, "a.md", 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading.as_deref(), Some("Title"));
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
    }

    #[test]
    fn oversized_sections_split_with_overlap() {
        let line = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let text = vec![line; 30].join("\n");
        let chunks = chunker(50, 1, 10).chunk(&text, "long.md", 0);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(count_tokens(&chunk.content) <= 50);
        }
        for pair in chunks.windows(2) {
            // One 10-token line of overlap between neighbours.
            assert_eq!(pair[1].start_line, pair[0].end_line);
        }
        assert_eq!(chunks.last().unwrap().end_line, 30);
    }

    #[test]
    fn huge_single_line_is_kept_whole() {
        let text = format!("short\n{}\nshort", vec!["word"; 80].join(" "));
        let chunks = chunker(50, 1, 10).chunk(&text, "a.md", 0);
        assert!(chunks.iter().any(|c| count_tokens(&c.content) == 80));
        assert_eq!(chunks.last().unwrap().end_line, 3);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "# A\none two three\n\n# B\nfour five six\n".repeat(20);
        let c = chunker(30, 5, 5);
        assert_eq!(c.chunk(&text, "x.md", 1), c.chunk(&text, "x.md", 1));
    }

    #[test]
    fn blank_documents_produce_no_chunks() {
        assert!(chunker(500, 1, 0).chunk("", "a.md", 0).is_empty());
        assert!(chunker(500, 1, 0).chunk("\n \n\t\n", "a.md", 0).is_empty());
        assert!(chunker(500, 1, 0).chunk("---\ntitle: x\n---\n", "a.md", 0).is_empty());
    }

    #[test]
    fn cjk_characters_count_individually() {
        assert_eq!(count_tokens("hello world"), 2);
        assert_eq!(count_tokens("笔记系统"), 4);
    }
}
