//! Storage module for generated artifacts
//!
//! A local, directory-backed store with collision-resistant naming and
//! per-file expiry.

mod naming;
mod store;
mod types;

pub use naming::{generate_file_name, sanitize_title, NamingToken, DEFAULT_TITLE, MAX_TITLE_BYTES, MAX_TITLE_CHARS};
pub use store::{validate_id, FileStore, StoreError, STAGING_DIR};
pub use types::*;
