//! PDF compression through qpdf stream recompression

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use super::security::{PdfSecurityError, QpdfSecurity};

/// How hard to try; higher levels take longer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 3] = [
        CompressionLevel::Low,
        CompressionLevel::Medium,
        CompressionLevel::High,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        }
    }

    /// qpdf options for this level
    ///
    /// Low only compresses uncompressed streams. Medium also packs objects
    /// into object streams. High additionally recompresses Flate streams at
    /// the strongest zlib level.
    pub fn qpdf_args(self) -> &'static [&'static str] {
        match self {
            CompressionLevel::Low => &["--compress-streams=y", "--object-streams=preserve"],
            CompressionLevel::Medium => &["--compress-streams=y", "--object-streams=generate"],
            CompressionLevel::High => &[
                "--compress-streams=y",
                "--object-streams=generate",
                "--recompress-flate",
                "--compression-level=9",
            ],
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionLevel {
    type Err = PdfSecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompressionLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PdfSecurityError::InvalidInput(format!(
                    "unknown compression level '{}', expected low, medium or high",
                    s
                ))
            })
    }
}

#[async_trait]
pub trait PdfCompressor: Send + Sync {
    /// Rewrite `pdf` with compressed streams
    ///
    /// Encrypted input without an empty user password fails with
    /// `PasswordRequired`.
    async fn compress(&self, pdf: &[u8], level: CompressionLevel) -> Result<Vec<u8>, PdfSecurityError>;
}

#[async_trait]
impl PdfCompressor for QpdfSecurity {
    async fn compress(&self, pdf: &[u8], level: CompressionLevel) -> Result<Vec<u8>, PdfSecurityError> {
        let compressed = self
            .run(pdf, false, &[], |input, output| {
                level
                    .qpdf_args()
                    .iter()
                    .map(|arg| std::ffi::OsString::from(*arg))
                    .chain([input.as_os_str().to_owned(), output.as_os_str().to_owned()])
                    .collect()
            })
            .await?;

        tracing::debug!(
            level = %level,
            input_bytes = pdf.len(),
            output_bytes = compressed.len(),
            "qpdf compress finished"
        );
        Ok(compressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!("low".parse::<CompressionLevel>().unwrap(), CompressionLevel::Low);
        assert_eq!(" HIGH ".parse::<CompressionLevel>().unwrap(), CompressionLevel::High);
        assert_eq!(CompressionLevel::default(), CompressionLevel::Medium);
        assert!(matches!(
            "extreme".parse::<CompressionLevel>(),
            Err(PdfSecurityError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_levels_build_on_each_other() {
        let low = CompressionLevel::Low.qpdf_args();
        let high = CompressionLevel::High.qpdf_args();
        assert!(low.contains(&"--compress-streams=y"));
        assert!(!low.contains(&"--recompress-flate"));
        assert!(CompressionLevel::Medium.qpdf_args().contains(&"--object-streams=generate"));
        assert!(high.contains(&"--recompress-flate"));
        assert!(high.contains(&"--compression-level=9"));
    }

    #[tokio::test]
    async fn test_qpdf_compress_when_installed() {
        let scratch = tempfile::TempDir::new().unwrap();
        let qpdf = QpdfSecurity::new("qpdf", scratch.path());
        if !qpdf.is_available().await {
            return;
        }

        let plain = crate::test_support::sample_pdf(&["Compress me", "Twice over"]);
        for level in CompressionLevel::ALL {
            let compressed = qpdf.compress(&plain, level).await.unwrap();
            let document = lopdf::Document::load_mem(&compressed).unwrap();
            assert_eq!(document.get_pages().len(), 2, "level {}", level);
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
