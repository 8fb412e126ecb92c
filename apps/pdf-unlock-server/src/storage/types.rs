//! Storage types

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of artifact held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Pptx,
}

impl FileKind {
    pub const ALL: [FileKind; 2] = [FileKind::Pdf, FileKind::Pptx];

    /// File extension without the dot
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Pptx => "pptx",
        }
    }

    /// Subdirectory of the store root holding this kind
    pub fn dir_name(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdfs",
            FileKind::Pptx => "pptx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            FileKind::Pdf => "application/pdf",
            FileKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }

    /// Resolve a kind from a file name's extension
    pub fn from_file_name(name: &str) -> Option<FileKind> {
        let (_, ext) = name.rsplit_once('.')?;
        FileKind::ALL
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(ext))
    }
}

/// A generated artifact registered in the store
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    /// Opaque identifier; also the on-disk file name
    pub id: String,
    pub display_name: String,
    #[serde(skip)]
    pub absolute_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub kind: FileKind,
}

impl StoredFile {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Sidecar metadata persisted next to each data file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FileMetadata {
    pub display_name: String,
    pub kind: FileKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(FileKind::from_file_name("a_1.pdf"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_file_name("deck.PPTX"), Some(FileKind::Pptx));
        assert_eq!(FileKind::from_file_name("a.pdf.meta"), None);
        assert_eq!(FileKind::from_file_name("noext"), None);
    }

    #[test]
    fn test_stored_file_serialization_hides_path() {
        let now = Utc::now();
        let file = StoredFile {
            id: "x.pdf".to_string(),
            display_name: "x.pdf".to_string(),
            absolute_path: PathBuf::from("/srv/secret/x.pdf"),
            created_at: now,
            expires_at: now,
            size_bytes: 3,
            kind: FileKind::Pdf,
        };

        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("absolute_path").is_none());
        assert_eq!(json["kind"], "pdf");
        assert!(file.is_expired_at(now));
    }
}
