//! PDF text extraction: page-by-page concatenation via `lopdf`.

use crate::pipeline::types::CancelToken;

use super::FormatFailure;

/// Extract text from every page, concatenated in page order. A page
/// whose text stream cannot be decoded contributes nothing; only a
/// document that fails to parse at all is a decode failure.
pub(crate) fn extract_pdf(
    payload: &[u8],
    cancel: &CancelToken,
) -> Result<(String, usize), FormatFailure> {
    let doc = lopdf::Document::load_mem(payload)
        .map_err(|e| FormatFailure::Decode(format!("PDF parse failed: {e}")))?;

    let pages = doc.get_pages();
    let page_count = pages.len();
    let mut text = String::new();

    for (&page_number, _) in pages.iter() {
        if cancel.is_cancelled() {
            return Err(FormatFailure::Cancelled);
        }
        let page_text = doc.extract_text(&[page_number]).unwrap_or_default();
        if !page_text.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(page_text.trim());
        }
    }

    Ok((text, page_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_a_decode_failure() {
        let result = extract_pdf(b"definitely not a pdf", &CancelToken::new());
        assert!(matches!(result, Err(FormatFailure::Decode(_))));
    }

    #[test]
    fn truncated_header_is_a_decode_failure() {
        let result = extract_pdf(b"%PDF-1.7\n", &CancelToken::new());
        assert!(matches!(result, Err(FormatFailure::Decode(_))));
    }
}
