//! Per-page PDF text extraction.
//!
//! Returns one [`Page`] per PDF page with cleaned text: lines are
//! trimmed and runs of whitespace collapsed to single spaces. Pages
//! without any text are dropped; page numbers still reflect the page's
//! position in the file (numbered from 1).

use docqa_core::models::Page;
use docqa_core::{RagError, Result};

/// Extract cleaned page texts from PDF bytes.
///
/// # Errors
///
/// Returns [`RagError::Extraction`] when the bytes are not a readable
/// PDF or no page yields any text.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<Page>> {
    let raw_pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {e}")))?;

    let pages: Vec<Page> = raw_pages
        .iter()
        .enumerate()
        .filter_map(|(i, text)| {
            let cleaned = clean_text(text);
            if cleaned.is_empty() {
                None
            } else {
                Some(Page {
                    page_number: i + 1,
                    text: cleaned,
                })
            }
        })
        .collect();

    if pages.is_empty() {
        return Err(RagError::Extraction(
            "no text could be extracted from the PDF".into(),
        ));
    }

    Ok(pages)
}

/// Collapse extracted text: drop blank lines, trim each line, squeeze
/// runs of whitespace into single spaces.
fn clean_text(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_whitespace() {
        let raw = "  A   heading  \n\n\n  body   text\twith\ttabs  \n";
        assert_eq!(clean_text(raw), "A heading body text with tabs");
    }

    #[test]
    fn clean_empty_input() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   \n \t \n"), "");
    }

    #[test]
    fn garbage_bytes_are_an_extraction_error() {
        let err = extract_pages(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }
}
