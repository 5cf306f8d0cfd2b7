//! Structured-document (DOCX) extraction: paragraph concatenation.
//!
//! A DOCX file is a zip container; visible text lives in
//! `word/document.xml` as `<w:t>` runs grouped into `<w:p>` paragraphs.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::pipeline::types::CancelToken;

use super::FormatFailure;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract paragraphs from a DOCX payload, joined by blank lines.
/// Returns the text and the paragraph count.
pub(crate) fn extract_docx(
    payload: &[u8],
    cancel: &CancelToken,
) -> Result<(String, usize), FormatFailure> {
    let mut archive = zip::ZipArchive::new(Cursor::new(payload))
        .map_err(|e| FormatFailure::Decode(format!("DOCX container unreadable: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| FormatFailure::Decode(format!("missing {DOCUMENT_PART}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| FormatFailure::Decode(format!("document part unreadable: {e}")))?;

    paragraphs_from_xml(&xml, cancel)
}

/// Walk the OOXML event stream collecting `<w:t>` text per paragraph.
fn paragraphs_from_xml(
    xml: &str,
    cancel: &CancelToken,
) -> Result<(String, usize), FormatFailure> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = true,
                b"w:tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"w:br" => current.push('\n'),
            Ok(Event::Text(t)) if in_text_run => {
                let chunk = t
                    .unescape()
                    .map_err(|e| FormatFailure::Decode(format!("bad text run: {e}")))?;
                current.push_str(&chunk);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    if cancel.is_cancelled() {
                        return Err(FormatFailure::Cancelled);
                    }
                    if !current.trim().is_empty() {
                        paragraphs.push(current.trim().to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FormatFailure::Decode(format!("malformed XML: {e}"))),
        }
    }

    let count = paragraphs.len();
    Ok((paragraphs.join("\n\n"), count))
}
