//! photosync-ingest library interface
//!
//! Exposes the pipeline for the binary and the integration tests.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{IngestError, Result};
