use crate::error::ExtractionError;
use crate::models::PageText;
use lopdf::Document;
use regex::Regex;
use std::path::Path;

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["pdf", "txt", "md", "html", "htm", "json"];

pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError>;
}

pub fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[derive(Default)]
pub struct LopdfExtractor;

impl DocumentExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let document =
            Document::load(path).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        if pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(ExtractionError::Empty(path.display().to_string()));
        }

        Ok(pages)
    }
}

/// Plain text, markdown, JSON and HTML. These formats have no pagination and
/// always produce a single page numbered 1.
#[derive(Default)]
pub struct TextExtractor;

impl DocumentExtractor for TextExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let raw = String::from_utf8_lossy(&bytes);

        let text = match extension_of(path).as_deref() {
            Some("html") | Some("htm") => strip_html(&raw)?,
            _ => raw.into_owned(),
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::Empty(path.display().to_string()));
        }

        Ok(vec![PageText { number: 1, text }])
    }
}

fn strip_html(html: &str) -> Result<String, ExtractionError> {
    let hidden = Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>")?;
    let block_end = Regex::new(r"(?i)</(p|div|h[1-6]|li|tr|section|article)\s*>|<br\s*/?>")?;
    let tags = Regex::new(r"(?s)<[^>]*>")?;

    let visible = hidden.replace_all(html, " ");
    let with_breaks = block_end.replace_all(&visible, "\n\n");
    let text = tags.replace_all(&with_breaks, " ");

    Ok(text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&"))
}

/// Dispatches on file extension to the matching extractor.
#[derive(Default)]
pub struct FileExtractor {
    pdf: LopdfExtractor,
    text: TextExtractor,
}

impl DocumentExtractor for FileExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        match extension_of(path).as_deref() {
            Some("pdf") => self.pdf.extract(path),
            Some(_) if is_supported(path) => self.text.extract(path),
            _ => Err(ExtractionError::UnsupportedFormat(path.display().to_string())),
        }
    }
}
