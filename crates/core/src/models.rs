use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 3;
pub const SOURCE_PREVIEW_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub source_file_name: String,
    pub page_number: Option<u32>,
    pub uploaded_at: DateTime<Utc>,
    pub mime_type: Option<String>,
}

impl Chunk {
    pub fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            source: self.source_file_name.clone(),
            page: self.page_number,
            uploaded_at: Some(self.uploaded_at.to_rfc3339()),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Citation metadata carried alongside every stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A chunk returned by nearest-neighbour search. Smaller `distance` is closer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: SourceMetadata,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub content: String,
    pub metadata: SourceMetadata,
}

impl Source {
    pub fn preview(chunk: &RetrievedChunk) -> Self {
        let mut content: String = chunk.text.chars().take(SOURCE_PREVIEW_CHARS).collect();
        if chunk.text.chars().count() > SOURCE_PREVIEW_CHARS {
            content.push_str("...");
        }
        Self {
            content,
            metadata: chunk.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub file_name: String,
    pub page_count: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReindexReport {
    pub document_count: usize,
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

pub fn mime_type_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "html" | "htm" => Some("text/html"),
        "json" => Some("application/json"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c-1".to_string(),
            text: text.to_string(),
            metadata: SourceMetadata {
                source: "notes.txt".to_string(),
                page: Some(1),
                uploaded_at: None,
                mime_type: None,
            },
            distance: None,
        }
    }

    #[test]
    fn preview_truncates_long_chunks() {
        let source = Source::preview(&retrieved(&"é".repeat(400)));
        assert_eq!(source.content.chars().count(), SOURCE_PREVIEW_CHARS + 3);
        assert!(source.content.ends_with("..."));
    }

    #[test]
    fn preview_keeps_short_chunks_intact() {
        let source = Source::preview(&retrieved("The sky is blue."));
        assert_eq!(source.content, "The sky is blue.");
        assert_eq!(source.metadata.source, "notes.txt");
    }

    #[test]
    fn metadata_serializes_in_camel_case_without_empty_fields() {
        let metadata = SourceMetadata {
            source: "a.pdf".to_string(),
            page: None,
            uploaded_at: Some("2024-01-01T00:00:00+00:00".to_string()),
            mime_type: None,
        };
        let value = serde_json::to_value(&metadata).expect("metadata serializes");
        assert_eq!(
            value,
            serde_json::json!({"source": "a.pdf", "uploadedAt": "2024-01-01T00:00:00+00:00"})
        );
    }
}
