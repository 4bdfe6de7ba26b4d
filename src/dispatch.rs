//! File-type classification used to route documents to an extractor.
//!
//! The decision is made purely from the file name: the extension is mapped to a MIME type and
//! the MIME type to one of five extraction paths. File contents are never inspected, so a
//! misnamed file goes down the wrong path and fails there.

use serde::Serialize;

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Extraction path selected for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Raster image, read by the OCR service.
    Image,
    /// PDF, read by the document-analysis service.
    Pdf,
    /// Word `.docx`, parsed locally.
    Word,
    /// Excel `.xlsx`, parsed locally.
    Excel,
    /// PowerPoint `.pptx`, parsed locally.
    PowerPoint,
}

impl FileKind {
    /// Classify a file by the MIME type guessed from its name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let mime = mime_guess::from_path(name).first()?;
        Self::from_mime(mime.essence_str())
    }

    /// Classify a MIME type string.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            m if m.starts_with("image/") => Some(Self::Image),
            PDF_MIME => Some(Self::Pdf),
            DOCX_MIME => Some(Self::Word),
            XLSX_MIME => Some(Self::Excel),
            PPTX_MIME => Some(Self::PowerPoint),
            _ => None,
        }
    }

    /// Whether the kind is parsed in-process rather than by a hosted service.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Word | Self::Excel | Self::PowerPoint)
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Excel => "excel",
            Self::PowerPoint => "powerpoint",
        };
        f.write_str(label)
    }
}
