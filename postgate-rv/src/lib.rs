//! # Postgate Review Service (postgate-rv)
//!
//! Human-in-the-loop approval gate between content generation and social
//! publication.
//!
//! **Purpose:** Accept content drafts, surface them to reviewers in a
//! Discord channel, record decisions, publish approved drafts to LinkedIn,
//! and reconcile everything that can go wrong in between through a
//! periodic poller.
//!
//! **Architecture:** SQLite-backed state machine; every status transition
//! is a conditional write, making all operations idempotent and safe under
//! concurrent delivery.

pub mod api;
pub mod error;
pub mod poller;
pub mod publisher;
pub mod surface;
pub mod workflow;

pub use error::{Error, Result};
pub use workflow::{Workflow, WorkflowConfig};
