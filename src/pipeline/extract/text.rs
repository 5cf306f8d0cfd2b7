//! Plain-text decoding.

use super::FormatFailure;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decode a plain-text payload as strict UTF-8 (BOM tolerated).
/// Malformed bytes are a decode failure, recovered by the caller into
/// fallback text.
pub(crate) fn extract_text(payload: &[u8]) -> Result<(String, usize), FormatFailure> {
    let bytes = payload.strip_prefix(UTF8_BOM).unwrap_or(payload);
    let text = std::str::from_utf8(bytes)
        .map_err(|e| FormatFailure::Decode(format!("invalid UTF-8: {e}")))?;
    Ok((text.trim().to_string(), 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8() {
        let (text, pages) = extract_text("hello world".as_bytes()).unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(pages, 1);
    }

    #[test]
    fn strips_bom() {
        let payload = [&[0xEF, 0xBB, 0xBF][..], b"content"].concat();
        let (text, _) = extract_text(&payload).unwrap();
        assert_eq!(text, "content");
    }

    #[test]
    fn invalid_utf8_is_a_decode_failure() {
        let result = extract_text(&[0xFF, 0xFE, 0x00, 0x41]);
        assert!(matches!(result, Err(FormatFailure::Decode(_))));
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        let (text, _) = extract_text(b"  padded  \n").unwrap();
        assert_eq!(text, "padded");
    }
}
