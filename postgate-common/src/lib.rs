//! # Postgate Common Library
//!
//! Shared code for the Postgate approval pipeline including:
//! - Database models and queries (drafts, submissions, settings)
//! - Workflow event types (PostgateEvent enum)
//! - Configuration loading
//! - Error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
