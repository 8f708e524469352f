//! Document references and the content materialized from them

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix Office uses for lock files next to an open document
const LOCK_FILE_PREFIX: &str = "~$";

/// Content kinds the converter understands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// HTML document
    Html,
    /// Plain text file
    Text,
    /// Markdown file
    Markdown,
    /// Anything else
    Unknown,
}

impl ContentKind {
    /// Detect content kind from a file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "html" | "htm" => Self::Html,
            "txt" | "text" => Self::Text,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Unknown,
        }
    }

    /// Detect content kind from a MIME type
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Docx
            }
            "text/html" => Self::Html,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            m if m.starts_with("text/") => Self::Text,
            _ => Self::Unknown,
        }
    }

    /// Detect content kind from a file name, falling back to a MIME guess
    pub fn from_name(name: &str) -> Self {
        let by_extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown);

        if by_extension != Self::Unknown {
            return by_extension;
        }

        mime_guess::from_path(name)
            .first()
            .map(|mime| Self::from_mime(mime.essence_str()))
            .unwrap_or(Self::Unknown)
    }

    /// MIME type sent along with uploads
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Html => "text/html",
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Already textual; no container to open
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text | Self::Markdown)
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Html => "HTML",
            Self::Text => "Text File",
            Self::Markdown => "Markdown",
            Self::Unknown => "Unknown",
        }
    }
}

/// Where a referenced document lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceLocation {
    /// A file on the local filesystem
    Local { path: PathBuf },
    /// A Google Drive file and the folders it currently sits in
    Drive { parents: Vec<String> },
}

/// One unit of work: identifier plus metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    /// Stable identifier (absolute path or remote file id)
    pub id: String,
    /// Display name
    pub name: String,
    /// Location metadata
    pub location: SourceLocation,
    /// MIME type reported by the source, if any
    pub mime_type: Option<String>,
}

impl DocumentReference {
    /// Reference a local file; the path doubles as identifier
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Self {
            id: path.to_string_lossy().to_string(),
            name,
            location: SourceLocation::Local { path },
            mime_type: None,
        }
    }

    /// Reference a file in a remote Drive folder
    pub fn drive(
        id: impl Into<String>,
        name: impl Into<String>,
        parents: Vec<String>,
        mime_type: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: SourceLocation::Drive { parents },
            mime_type,
        }
    }

    /// Content kind, preferring the source's MIME type over the name
    pub fn kind(&self) -> ContentKind {
        match self.mime_type.as_deref().map(ContentKind::from_mime) {
            Some(kind) if kind != ContentKind::Unknown => kind,
            _ => ContentKind::from_name(&self.name),
        }
    }

    /// Lock files left behind by editors are never work items
    pub fn is_lock_file(&self) -> bool {
        self.name.starts_with(LOCK_FILE_PREFIX)
    }

    /// Local path, if this is a local reference
    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            SourceLocation::Local { path } => Some(path),
            SourceLocation::Drive { .. } => None,
        }
    }
}

/// Raw bytes fetched for one item, owned by the iteration that fetched them
#[derive(Debug)]
pub struct FetchedContent {
    /// Raw document bytes
    pub data: Vec<u8>,
    /// Declared content kind
    pub kind: ContentKind,
}

impl FetchedContent {
    pub fn new(data: Vec<u8>, kind: ContentKind) -> Self {
        Self { data, kind }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Format of an intermediate representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Normalized text handed to the extraction service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateText {
    pub content: String,
    pub format: TextFormat,
}

impl IntermediateText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: TextFormat::Plain,
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: TextFormat::Markdown,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// File name used when uploading the text as a document
    pub fn upload_name(&self) -> &'static str {
        match self.format {
            TextFormat::Plain => "document.txt",
            TextFormat::Markdown => "document.md",
        }
    }
}
