//! Source-format extraction: splitting an uploaded document into text and
//! media artifacts named through the key codec.

pub mod office;
pub mod pdf;

use bytes::Bytes;
use thiserror::Error;

pub use office::{OfficeExtractor, OfficeKind};
pub use pdf::{PdfExtractor, PdfImageFilters};

/// Upload formats the pipeline recognizes, classified from the key extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Docx,
    Pptx,
    Image,
    Video,
    Text,
}

impl SourceFormat {
    pub fn from_key(key: &str) -> Option<Self> {
        let ext = crate::keys::extension(key)?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceFormat::Pdf),
            "docx" => Some(SourceFormat::Docx),
            "pptx" => Some(SourceFormat::Pptx),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => Some(SourceFormat::Image),
            "mp4" | "mov" | "avi" | "mkv" | "webm" => Some(SourceFormat::Video),
            "txt" | "json" => Some(SourceFormat::Text),
            _ => None,
        }
    }
}

/// One extracted text artifact, already keyed for the processing area.
#[derive(Debug, Clone)]
pub struct TextArtifact {
    pub key: String,
    pub body: Bytes,
}

/// One extracted media artifact (embedded image, media file).
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    pub key: String,
    pub body: Bytes,
}

/// Full extraction output for one source document. Artifacts are staged here
/// and only written to the store once the whole extraction succeeded, so a
/// malformed document never leaves a partial commit behind.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: Vec<TextArtifact>,
    pub media: Vec<MediaArtifact>,
}

/// Errors raised while splitting a source document.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed archive: {0}")]
    Archive(String),

    #[error("malformed pdf: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to re-encode embedded image: {0}")]
    ImageEncode(#[from] image::ImageError),

    #[error("malformed document: {0}")]
    Malformed(String),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(e: zip::result::ZipError) -> Self {
        ExtractError::Archive(e.to_string())
    }
}

/// A per-format document splitter. Implementations are CPU-bound and
/// synchronous; the pipeline runs them on a blocking thread.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, source_key: &str, bytes: &[u8]) -> Result<Extraction, ExtractError>;
}

/// Extractor for a document format, or `None` for formats that moderate the
/// source directly (image, video, plain text are their own artifact).
pub fn extractor_for(
    format: SourceFormat,
    pdf_filters: PdfImageFilters,
) -> Option<Box<dyn DocumentExtractor>> {
    match format {
        SourceFormat::Pdf => Some(Box::new(PdfExtractor::new(pdf_filters))),
        SourceFormat::Docx => Some(Box::new(OfficeExtractor::new(OfficeKind::Docx))),
        SourceFormat::Pptx => Some(Box::new(OfficeExtractor::new(OfficeKind::Pptx))),
        SourceFormat::Image | SourceFormat::Video | SourceFormat::Text => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_classification_is_extension_driven() {
        assert_eq!(SourceFormat::from_key("a/b.pdf"), Some(SourceFormat::Pdf));
        assert_eq!(SourceFormat::from_key("a/b.PPTX"), Some(SourceFormat::Pptx));
        assert_eq!(SourceFormat::from_key("a/b.jpeg"), Some(SourceFormat::Image));
        assert_eq!(SourceFormat::from_key("a/b.mov"), Some(SourceFormat::Video));
        assert_eq!(SourceFormat::from_key("a/b.json"), Some(SourceFormat::Text));
        assert_eq!(SourceFormat::from_key("a/b.xlsx"), None);
        assert_eq!(SourceFormat::from_key("no-extension"), None);
    }
}
