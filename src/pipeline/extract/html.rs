//! HTML extraction: visible paragraph concatenation via `scraper`.

use scraper::{Html, Selector};

use crate::pipeline::types::CancelToken;

use super::FormatFailure;

const BLOCK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li";

/// Extract block-level text from an HTML payload. Falls back to the
/// whole document's text when no block elements are present.
pub(crate) fn extract_html(
    payload: &[u8],
    cancel: &CancelToken,
) -> Result<(String, usize), FormatFailure> {
    let raw = String::from_utf8_lossy(payload);
    let document = Html::parse_document(&raw);
    let selector = Selector::parse(BLOCK_SELECTOR)
        .map_err(|e| FormatFailure::Decode(format!("selector parse failed: {e}")))?;

    let mut blocks: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        if cancel.is_cancelled() {
            return Err(FormatFailure::Cancelled);
        }
        let text = element.text().collect::<String>();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    if blocks.is_empty() {
        let text = document.root_element().text().collect::<String>();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let count = usize::from(!text.is_empty());
        return Ok((text, count));
    }

    let count = blocks.len();
    Ok((blocks.join("\n\n"), count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_concatenated_in_order() {
        let html = b"<html><body><h1>Title</h1><p>First.</p><p>Second.</p></body></html>";
        let (text, count) = extract_html(html, &CancelToken::new()).unwrap();
        assert_eq!(count, 3);
        assert_eq!(text, "Title\n\nFirst.\n\nSecond.");
    }

    #[test]
    fn nested_markup_is_flattened() {
        let html = b"<p>A <b>bold</b> and <i>italic</i> mix</p>";
        let (text, _) = extract_html(html, &CancelToken::new()).unwrap();
        assert_eq!(text, "A bold and italic mix");
    }

    #[test]
    fn bare_text_without_blocks_still_extracts() {
        let html = b"<html><body>just loose text</body></html>";
        let (text, count) = extract_html(html, &CancelToken::new()).unwrap();
        assert_eq!(text, "just loose text");
        assert_eq!(count, 1);
    }

    #[test]
    fn cancellation_observed_at_block_boundary() {
        let token = CancelToken::new();
        token.cancel();
        let result = extract_html(b"<p>one</p><p>two</p>", &token);
        assert!(matches!(result, Err(FormatFailure::Cancelled)));
    }
}
