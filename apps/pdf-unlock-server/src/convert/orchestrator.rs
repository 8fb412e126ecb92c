//! Conversion orchestrator
//!
//! Resolves a source document, extracts its content, lays it out on slides,
//! assembles a presentation and stores the result.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use super::chunker::build_deck;
use super::extractor::{ContentExtractor, ExtractError};
use super::pptx::{AssembleError, DeckAssembler};
use super::types::{ChunkingOptions, ConversionRequest};
use crate::pdf::has_pdf_header;
use crate::storage::{sanitize_title, validate_id, FileKind, FileStore, StoreError, StoredFile};

/// Pipeline stage a conversion failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Fetch,
    Extract,
    Assemble,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionStage::Fetch => "fetch",
            ConversionStage::Extract => "extract",
            ConversionStage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// Underlying failure of a conversion stage
#[derive(Debug, thiserror::Error)]
pub enum ConversionCause {
    #[error(transparent)]
    Fetch(#[from] reqwest::Error),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Source exceeds the {limit} byte limit")]
    SourceTooLarge { limit: usize },

    #[error("Conversion failed during {stage}: {cause}")]
    ConversionFailed {
        stage: ConversionStage,
        #[source]
        cause: ConversionCause,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConvertError {
    fn failed(stage: ConversionStage, cause: impl Into<ConversionCause>) -> Self {
        ConvertError::ConversionFailed {
            stage,
            cause: cause.into(),
        }
    }
}

/// Result of a successful conversion
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub file: StoredFile,
    pub slide_count: usize,
}

/// A source document located on disk
struct ResolvedSource {
    path: PathBuf,
    /// Title used when the request carries no output name
    stem: String,
    /// Downloaded into staging; removed once read
    temporary: bool,
}

// ============================================================================
// Converter
// ============================================================================

#[derive(Clone)]
pub struct Converter {
    inner: Arc<ConverterInner>,
}

struct ConverterInner {
    store: FileStore,
    extractor: Arc<dyn ContentExtractor>,
    assembler: Arc<dyn DeckAssembler>,
    chunking: ChunkingOptions,
    http: reqwest::Client,
    fetch_timeout: Duration,
    max_source_bytes: usize,
}

impl Converter {
    pub fn new(
        store: FileStore,
        extractor: Arc<dyn ContentExtractor>,
        assembler: Arc<dyn DeckAssembler>,
        chunking: ChunkingOptions,
        fetch_timeout: Duration,
        max_source_bytes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ConverterInner {
                store,
                extractor,
                assembler,
                chunking,
                http: reqwest::Client::new(),
                fetch_timeout,
                max_source_bytes,
            }),
        }
    }

    pub fn chunking(&self) -> ChunkingOptions {
        self.inner.chunking
    }

    /// Convert a PDF into a stored presentation
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome, ConvertError> {
        let source = self.resolve_source(&request.source_path).await?;
        let read = tokio::fs::read(&source.path).await;
        if source.temporary {
            let _ = tokio::fs::remove_file(&source.path).await;
        }
        let pdf = read.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConvertError::SourceNotFound(request.source_path.clone()),
            _ => ConvertError::failed(ConversionStage::Fetch, e),
        })?;

        if pdf.len() > self.inner.max_source_bytes {
            return Err(ConvertError::SourceTooLarge {
                limit: self.inner.max_source_bytes,
            });
        }
        if !has_pdf_header(&pdf) {
            return Err(ConvertError::UnsupportedFormat(format!(
                "{} is not a PDF document",
                request.source_path
            )));
        }

        let title = request
            .output_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or(source.stem);

        let extractor = Arc::clone(&self.inner.extractor);
        let include_images = request.include_images;
        let chunking = self.inner.chunking;
        let deck_title = title.clone();
        let deck = tokio::task::spawn_blocking(move || {
            extractor
                .extract(&pdf, include_images)
                .map(|document| build_deck(&deck_title, &document, chunking))
        })
        .await
        .map_err(|e| ConvertError::failed(ConversionStage::Extract, e))?
        .map_err(|e| ConvertError::failed(ConversionStage::Extract, e))?;

        let slide_count = deck.slides.len();
        let assembler = Arc::clone(&self.inner.assembler);
        let bytes = tokio::task::spawn_blocking(move || assembler.assemble(&deck))
            .await
            .map_err(|e| ConvertError::failed(ConversionStage::Assemble, e))?
            .map_err(|e| ConvertError::failed(ConversionStage::Assemble, e))?;

        let display_name = format!("{}.{}", title, FileKind::Pptx.extension());
        let file = self.inner.store.put(FileKind::Pptx, &display_name, &bytes).await?;

        tracing::info!(
            source = %request.source_path,
            file_id = %file.id,
            slide_count,
            size_bytes = file.size_bytes,
            "Converted PDF to presentation"
        );

        Ok(ConversionOutcome { file, slide_count })
    }

    async fn resolve_source(&self, source: &str) -> Result<ResolvedSource, ConvertError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ConvertError::SourceNotFound(source.to_string()));
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch(source).await;
        }

        if validate_id(source) == Some(FileKind::Pdf) {
            if let Ok(stored) = self.inner.store.get(source).await {
                return Ok(ResolvedSource {
                    stem: file_stem(&stored.display_name),
                    path: stored.absolute_path,
                    temporary: false,
                });
            }
        }

        let path = PathBuf::from(source);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(ResolvedSource {
                stem: file_stem(source),
                path,
                temporary: false,
            }),
            _ => Err(ConvertError::SourceNotFound(source.to_string())),
        }
    }

    /// Download a URL source into the staging area
    async fn fetch(&self, url: &str) -> Result<ResolvedSource, ConvertError> {
        let fetch_failed = |e: reqwest::Error| ConvertError::failed(ConversionStage::Fetch, e);

        let mut response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.fetch_timeout)
            .send()
            .await
            .map_err(fetch_failed)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ConvertError::SourceNotFound(url.to_string()));
        }
        response = response.error_for_status().map_err(fetch_failed)?;

        let path = self.inner.store.staging_path("pdf");
        let result = async {
            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| ConvertError::failed(ConversionStage::Fetch, e))?;
            let mut received = 0usize;
            while let Some(chunk) = response.chunk().await.map_err(fetch_failed)? {
                received += chunk.len();
                if received > self.inner.max_source_bytes {
                    return Err(ConvertError::SourceTooLarge {
                        limit: self.inner.max_source_bytes,
                    });
                }
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ConvertError::failed(ConversionStage::Fetch, e))?;
            }
            file.flush()
                .await
                .map_err(|e| ConvertError::failed(ConversionStage::Fetch, e))?;
            Ok::<usize, ConvertError>(received)
        }
        .await;

        match result {
            Ok(received) => {
                tracing::debug!(url, bytes = received, "Downloaded source document");
                Ok(ResolvedSource {
                    stem: url_stem(url),
                    path,
                    temporary: true,
                })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| sanitize_title(name))
}

/// Last path segment of a URL without its extension
fn url_stem(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let segment = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    file_stem(&segment)
}
