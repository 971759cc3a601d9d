//! # photosync common library
//!
//! Shared code for the photosync crates:
//! - Error types
//! - Event codes and the `EventRecorder`
//! - Configuration loading and priority resolution
//! - Retry/backoff policy
//! - Human-readable size formatting

pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod human_size;

pub use backoff::ExponentialBackoff;
pub use error::{Error, Result};
pub use events::{EventCode, EventRecorder, FileRef};
