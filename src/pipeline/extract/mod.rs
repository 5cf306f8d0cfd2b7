//! Content Extractor — raw bytes in, plain text plus analysis out.
//!
//! Dispatch is by declared media type. Decode failures never escape
//! this module: they degrade into documented fallback text so the
//! pipeline continues with reduced content instead of aborting. Only a
//! payload that is unreadable at all surfaces as an error.

pub mod analysis;
mod docx;
mod html;
mod pdf;
mod text;

use thiserror::Error;

use super::types::{CancelToken, ExtractionResult};

pub use analysis::analyze;

/// DOCX media type (the OOXML wordprocessing document).
const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Catastrophic extraction errors. Everything else degrades.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("extraction cancelled")]
    Cancelled,
}

/// Supported media families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Docx,
    Html,
    PlainText,
    Unknown,
}

impl MediaKind {
    /// Classify a declared media type. Parameters (`; charset=...`) are
    /// ignored; unknown types degrade rather than fail.
    pub fn from_media_type(media_type: &str) -> Self {
        let base = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match base.as_str() {
            "application/pdf" => Self::Pdf,
            t if t == DOCX_MEDIA_TYPE => Self::Docx,
            "text/html" | "application/xhtml+xml" => Self::Html,
            t if t.starts_with("text/") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Label used in fallback messages.
    fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Html => "HTML",
            Self::PlainText => "TEXT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Internal failure of one format decoder. `Decode` is recoverable
/// (fallback text); `Cancelled` propagates.
#[derive(Debug)]
pub(crate) enum FormatFailure {
    Decode(String),
    Cancelled,
}

fn fallback_text(kind: MediaKind) -> String {
    format!("{} extraction failed — using fallback processing", kind.label())
}

/// Extract plain text and analysis from a raw payload.
///
/// Pure and synchronous. The cancellation token is checked at page and
/// paragraph loop boundaries; a cancelled extraction returns
/// [`ExtractError::Cancelled`] rather than partial text.
pub fn extract(
    payload: &[u8],
    media_type: &str,
    file_name: &str,
    cancel: &CancelToken,
) -> Result<ExtractionResult, ExtractError> {
    if payload.is_empty() {
        return Err(ExtractError::EmptyPayload);
    }

    let kind = MediaKind::from_media_type(media_type);

    let decoded = match kind {
        MediaKind::Pdf => Some(pdf::extract_pdf(payload, cancel)),
        MediaKind::Docx => Some(docx::extract_docx(payload, cancel)),
        MediaKind::Html => Some(html::extract_html(payload, cancel)),
        MediaKind::PlainText => Some(text::extract_text(payload)),
        MediaKind::Unknown => None,
    };

    let (text, page_count, degraded) = match decoded {
        Some(Ok((text, pages))) if !text.trim().is_empty() => (text, pages, false),
        Some(Ok((_, pages))) => {
            // Parsed but produced no text; degrade like a decode failure.
            tracing::warn!(media_type, file_name, "extraction produced no text");
            (fallback_text(kind), pages, true)
        }
        Some(Err(FormatFailure::Cancelled)) => return Err(ExtractError::Cancelled),
        Some(Err(FormatFailure::Decode(reason))) => {
            tracing::warn!(media_type, file_name, reason, "extraction degraded to fallback");
            (fallback_text(kind), 0, true)
        }
        None => {
            tracing::info!(media_type, file_name, "unsupported media type, using placeholder");
            (format!("File uploaded: {file_name}"), 0, true)
        }
    };

    let analysis = analysis::analyze(&text);

    Ok(ExtractionResult {
        source_name: file_name.to_string(),
        text,
        page_count,
        analysis,
        degraded,
        dry_run: false,
    })
}
