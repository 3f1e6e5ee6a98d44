//! # chantrack Common Library
//!
//! Shared code for the chantrack services including:
//! - Domain model (entities, enrichable fields, member records)
//! - Event types (TrackerEvent enum) and the EventBus
//! - Configuration loading
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod sse;

pub use error::{Error, Result};
