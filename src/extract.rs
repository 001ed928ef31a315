//! PDF text extraction adapter.
//!
//! Thin wrapper over `pdf-extract`: takes the bytes of an uploaded PDF and
//! returns plain UTF-8 text plus light metadata. Extraction failures return
//! an error (no panic); the pipeline propagates them as the extraction step
//! is on the critical path and has no fallback.

use std::path::Path;

/// Extraction error (no panic; callers surface this as a 5xx-equivalent).
#[derive(Debug)]
pub enum ExtractError {
    NotAPdf(String),
    Io(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::NotAPdf(name) => write!(f, "file is not a PDF: {}", name),
            ExtractError::Io(e) => write!(f, "failed to read PDF: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Text content of a single page.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub page_number: usize,
    pub text: String,
}

/// Extracted content of a whole document.
///
/// Transient: consumed once by the summarizer and then discarded.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// Full text with `--- Page N ---` markers between pages.
    pub text: String,
    pub pages: Vec<PageContent>,
    pub num_pages: usize,
    /// Extractor identifier, recorded for provenance.
    pub method: String,
}

/// Extract text from in-memory PDF bytes.
pub fn extract_pdf_bytes(bytes: &[u8]) -> Result<ExtractedContent, ExtractError> {
    let raw =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    // pdf-extract separates pages with form feeds; a document without any
    // is treated as a single page.
    let page_texts: Vec<&str> = if raw.contains('\u{c}') {
        raw.split('\u{c}').collect()
    } else {
        vec![raw.as_str()]
    };

    let mut pages = Vec::with_capacity(page_texts.len());
    let mut text = String::new();
    for (idx, page_text) in page_texts.iter().enumerate() {
        let page_number = idx + 1;
        text.push_str(&format!("\n--- Page {} ---\n{}\n", page_number, page_text));
        pages.push(PageContent {
            page_number,
            text: page_text.to_string(),
        });
    }

    let num_pages = pages.len();
    Ok(ExtractedContent {
        text,
        pages,
        num_pages,
        method: "pdf-extract".to_string(),
    })
}

/// Extract text from a PDF file on disk.
///
/// Rejects non-`.pdf` paths before reading anything, mirroring the upload
/// validation on the HTTP side.
pub fn extract_pdf_file(path: &Path) -> Result<ExtractedContent, ExtractError> {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(ExtractError::NotAPdf(path.display().to_string()));
    }

    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
    extract_pdf_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf_bytes(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn non_pdf_extension_rejected_before_read() {
        let err = extract_pdf_file(Path::new("/nonexistent/notes.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::NotAPdf(_)));
    }

    #[test]
    fn pdf_extension_is_case_insensitive() {
        // Missing file with a .PDF extension fails on read, not on the
        // extension check.
        let err = extract_pdf_file(Path::new("/nonexistent/doc.PDF")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
