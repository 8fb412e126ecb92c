//! Configuration management for the PDF Unlock server
//!
//! Values come from the process environment (after `dotenvy` has loaded a
//! `.env` file, if any). Every variable has a default so the server boots with
//! an empty environment, and a malformed variable only resets itself.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::convert::ChunkingOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cleanup: CleanupConfig,
    pub security: SecurityConfig,
    pub conversion: ConversionConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Tokio worker threads
    pub workers: usize,
    /// Prefix used when building download URLs
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root of the file store (`pdfs/`, `pptx/` and `.staging/` live below it)
    pub root_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub file_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    pub autostart: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,
    pub api_key_header: String,
    pub api_key: Option<String>,
    pub qpdf_path: String,
}

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub max_blocks_per_slide: usize,
    pub max_chars_per_block: usize,
    pub source_fetch_timeout_secs: u64,
}

impl ConversionConfig {
    pub fn chunking(&self) -> ChunkingOptions {
        ChunkingOptions {
            max_blocks_per_slide: self.max_blocks_per_slide,
            max_chars_per_block: self.max_chars_per_block,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Value for {name} out of range {min}..={max}: {value:?}")]
    OutOfRange {
        name: &'static str,
        value: String,
        min: i64,
        max: i64,
    },
}

/// Upper bound for `FILE_TTL_HOURS` (ten years)
pub const MAX_FILE_TTL_HOURS: i64 = 24 * 365 * 10;

const DEFAULT_PORT: u16 = 8000;

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                workers: default_workers(),
                public_base_url: format!("http://localhost:{}", DEFAULT_PORT),
            },
            storage: StorageConfig {
                root_dir: PathBuf::from("outputs"),
                max_upload_bytes: 50 * 1024 * 1024,
                file_ttl_hours: 24,
            },
            cleanup: CleanupConfig {
                interval_secs: 3600,
                autostart: true,
            },
            security: SecurityConfig {
                cors_origins: vec!["*".to_string()],
                api_key_header: "x-api-key".to_string(),
                api_key: None,
                qpdf_path: "qpdf".to_string(),
            },
            conversion: ConversionConfig {
                max_blocks_per_slide: 6,
                max_chars_per_block: 400,
                source_fetch_timeout_secs: 30,
            },
        }
    }
}

impl Config {
    /// Load from the process environment
    ///
    /// An invalid variable falls back to its own default with a warning; the
    /// remaining variables are still honored.
    pub fn from_env() -> Self {
        let (config, problems) = Self::from_lookup(|name| env::var(name).ok());
        for problem in problems {
            tracing::warn!("{}, using the default", problem);
        }
        config
    }

    /// Build a config from an arbitrary variable source
    ///
    /// Returns the config together with every value that had to be replaced
    /// by its default.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let mut vars = EnvSource {
            lookup,
            problems: Vec::new(),
        };

        let port = if vars.get("PORT").is_some() {
            vars.parse("PORT", defaults.server.port)
        } else {
            vars.parse("SERVER_PORT", defaults.server.port)
        };

        let config = Config {
            server: ServerConfig {
                host: vars.get("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
                workers: vars.parse("WORKERS", defaults.server.workers).max(1),
                public_base_url: vars
                    .get("PUBLIC_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| format!("http://localhost:{}", port)),
            },
            storage: StorageConfig {
                root_dir: vars
                    .get("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.root_dir),
                max_upload_bytes: vars
                    .parse::<usize>("MAX_UPLOAD_SIZE_MB", 50)
                    .saturating_mul(1024 * 1024),
                file_ttl_hours: vars.parse_bounded(
                    "FILE_TTL_HOURS",
                    defaults.storage.file_ttl_hours,
                    1,
                    MAX_FILE_TTL_HOURS,
                ),
            },
            cleanup: CleanupConfig {
                interval_secs: vars
                    .parse("CLEANUP_INTERVAL_SECS", defaults.cleanup.interval_secs)
                    .max(1),
                autostart: vars.parse_bool("CLEANUP_AUTOSTART", defaults.cleanup.autostart),
            },
            security: SecurityConfig {
                cors_origins: vars
                    .get("CORS_ORIGINS")
                    .map(|raw| split_list(&raw))
                    .unwrap_or(defaults.security.cors_origins),
                api_key_header: vars
                    .get("API_KEY_HEADER")
                    .map(|h| h.to_ascii_lowercase())
                    .unwrap_or(defaults.security.api_key_header),
                api_key: vars.get("API_KEY").filter(|k| !k.is_empty()),
                qpdf_path: vars.get("QPDF_PATH").unwrap_or(defaults.security.qpdf_path),
            },
            conversion: ConversionConfig {
                max_blocks_per_slide: vars
                    .parse("SLIDE_MAX_BLOCKS", defaults.conversion.max_blocks_per_slide)
                    .max(1),
                max_chars_per_block: vars
                    .parse("SLIDE_MAX_CHARS", defaults.conversion.max_chars_per_block)
                    .max(1),
                source_fetch_timeout_secs: vars.parse(
                    "SOURCE_FETCH_TIMEOUT_SECS",
                    defaults.conversion.source_fetch_timeout_secs,
                ),
            },
        };

        (config, vars.problems)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Variable source that records invalid values instead of failing
struct EnvSource<F> {
    lookup: F,
    problems: Vec<ConfigError>,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn parse<T: FromStr>(&mut self, name: &'static str, default: T) -> T {
        let Some(raw) = self.get(name) else {
            return default;
        };
        match parse_value(name, raw) {
            Ok(value) => value,
            Err(e) => {
                self.problems.push(e);
                default
            }
        }
    }

    fn parse_bounded(&mut self, name: &'static str, default: i64, min: i64, max: i64) -> i64 {
        let value = self.parse(name, default);
        if (min..=max).contains(&value) {
            return value;
        }
        self.problems.push(ConfigError::OutOfRange {
            name,
            value: value.to_string(),
            min,
            max,
        });
        default
    }

    fn parse_bool(&mut self, name: &'static str, default: bool) -> bool {
        let Some(raw) = self.get(name) else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                self.problems.push(ConfigError::InvalidValue { name, value: raw });
                default
            }
        }
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value: raw })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
