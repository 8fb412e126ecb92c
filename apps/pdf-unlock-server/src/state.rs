//! Application state management

use std::sync::Arc;
use std::time::Duration;

use crate::cleanup::ExpirySweeper;
use crate::config::Config;
use crate::convert::{ContentExtractor, Converter, DeckAssembler, LopdfExtractor, PptxAssembler};
use crate::pdf::{PdfCompressor, PdfSecurity, QpdfSecurity};
use crate::storage::{FileStore, StoreError};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to open file store: {0}")]
    Store(#[from] StoreError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: FileStore,
    sweeper: ExpirySweeper,
    converter: Converter,
    security: Arc<dyn PdfSecurity>,
    compressor: Arc<dyn PdfCompressor>,
}

impl AppState {
    /// Create the state with the production capabilities
    pub async fn new(config: Config) -> Result<Self, StateError> {
        let store = FileStore::open(
            &config.storage.root_dir,
            chrono::Duration::hours(config.storage.file_ttl_hours),
        )
        .await?;
        let qpdf = Arc::new(QpdfSecurity::new(
            config.security.qpdf_path.clone(),
            store.staging_dir(),
        ));

        Ok(Self::with_components(
            config,
            store,
            qpdf.clone(),
            qpdf,
            Arc::new(LopdfExtractor),
            Arc::new(PptxAssembler),
        ))
    }

    /// Create the state around an already opened store and explicit capabilities
    pub fn with_components(
        config: Config,
        store: FileStore,
        security: Arc<dyn PdfSecurity>,
        compressor: Arc<dyn PdfCompressor>,
        extractor: Arc<dyn ContentExtractor>,
        assembler: Arc<dyn DeckAssembler>,
    ) -> Self {
        let sweeper = ExpirySweeper::new(
            store.clone(),
            Duration::from_secs(config.cleanup.interval_secs),
        );
        let converter = Converter::new(
            store.clone(),
            extractor,
            assembler,
            config.conversion.chunking(),
            Duration::from_secs(config.conversion.source_fetch_timeout_secs),
            config.storage.max_upload_bytes,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                sweeper,
                converter,
                security,
                compressor,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &FileStore {
        &self.inner.store
    }

    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.inner.sweeper
    }

    pub fn converter(&self) -> &Converter {
        &self.inner.converter
    }

    pub fn security(&self) -> &dyn PdfSecurity {
        self.inner.security.as_ref()
    }

    pub fn compressor(&self) -> &dyn PdfCompressor {
        self.inner.compressor.as_ref()
    }

    /// Absolute download URL for a route path
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.inner.config.server.public_base_url, path)
    }
}
