use crate::error::ChunkingError;
use crate::models::{Chunk, IngestionOptions, PageText};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Split points tried in priority order: paragraph, line, sentence, word,
/// then single characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Unifies line endings and non-breaking spaces, strips trailing spaces and
/// collapses runs of blank lines into a single paragraph break.
pub fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n").replace('\u{a0}', " ");

    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in unified.lines() {
        let line = line.trim_end();
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(line);
        previous_blank = blank;
    }

    lines.join("\n").trim().to_string()
}

pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, ChunkingError> {
    config.validate()?;
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }
    Ok(split_recursive(&normalized, &DEFAULT_SEPARATORS, config))
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let position = separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or(&[]);

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) <= config.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, config));
            pending.clear();
        }

        if finer.is_empty() {
            push_trimmed(&mut chunks, piece.to_string());
        } else {
            chunks.extend(split_recursive(piece, finer, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, config));
    }

    chunks
}

fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(index, ch)| &text[index..index + ch.len_utf8()])
            .collect();
    }

    text.split_inclusive(separator)
        .filter(|piece| !piece.is_empty())
        .collect()
}

// Greedy packing: once a chunk is full, the window keeps only as many trailing
// pieces as fit in `overlap` before the next piece is appended.
fn merge_pieces(pieces: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);

        if total + len > config.chunk_size && !window.is_empty() {
            push_trimmed(&mut chunks, window.iter().copied().collect());

            while total > config.overlap || (total + len > config.chunk_size && total > 0) {
                match window.pop_front() {
                    Some(front) => total -= char_len(front),
                    None => break,
                }
            }
        }

        window.push_back(piece);
        total += len;
    }

    if !window.is_empty() {
        push_trimmed(&mut chunks, window.iter().copied().collect());
    }

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: String) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits every page independently so each chunk carries the page it starts on.
pub fn build_chunks(
    pages: &[PageText],
    source_file_name: &str,
    uploaded_at: DateTime<Utc>,
    mime_type: Option<&str>,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        for text in split_text(&page.text, config)? {
            chunks.push(Chunk {
                chunk_id: make_chunk_id(source_file_name, page.number, cursor, &text),
                text,
                source_file_name: source_file_name.to_string(),
                page_number: Some(page.number),
                uploaded_at,
                mime_type: mime_type.map(str::to_string),
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(source_file_name: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_file_name.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
