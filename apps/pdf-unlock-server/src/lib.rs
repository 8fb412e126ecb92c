//! PDF Unlock server library
//!
//! The binary in main.rs only wires configuration, logging and the listener
//! around [`routes::app`].
//!
//! # Modules
//!
//! - `storage`: on-disk file store with TTL metadata
//! - `cleanup`: background expiry sweeper
//! - `pdf`: password removal and encryption through qpdf
//! - `convert`: PDF to PowerPoint conversion pipeline
//! - `routes`: HTTP handlers

pub mod cleanup;
pub mod config;
pub mod convert;
pub mod error;
pub mod pdf;
pub mod routes;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;
