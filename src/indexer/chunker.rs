/// Sliding-window line chunker.
///
/// Fixed-size windows with configurable overlap, so context at a symbol's
/// boundary is not lost between adjacent chunks. The final partial window
/// is always emitted even when shorter than the target size.
use crate::symbols::content_hash;

use super::Chunk;

/// Map a file extension to a language name. Returns `None` for anything
/// the extractor has no patterns for; such files still chunk and embed.
#[must_use]
pub fn detect_language(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    match ext {
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" | "mjs" => Some("javascript"),
        "rs" => Some("rust"),
        "py" => Some("python"),
        "go" => Some("go"),
        _ => None,
    }
}

/// Split `content` into overlapping line windows of `chunk_lines` lines.
#[must_use]
pub fn chunk_file(path: &str, content: &str, chunk_lines: usize, overlap: usize) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let window = chunk_lines.max(1);
    // Overlap never swallows forward progress.
    let step = window.saturating_sub(overlap).max(1);
    let language = detect_language(path).map(str::to_string);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(lines.len());
        let slice = lines[start..end].join("\n");

        let start_line = (start + 1) as u32;
        let end_line = end as u32;
        chunks.push(Chunk {
            id: chunk_id(path, start_line, end_line),
            path: path.to_string(),
            start_line,
            end_line,
            content_hash: content_hash(&slice),
            content: slice,
            language: language.clone(),
            symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            has_embedding: false,
        });

        if end == lines.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Deterministic chunk id from (path, start, end).
#[must_use]
pub fn chunk_id(path: &str, start_line: u32, end_line: u32) -> String {
    content_hash(&format!("{path}\u{1f}{start_line}\u{1f}{end_line}"))
}
