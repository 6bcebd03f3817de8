//! Database models and queries

pub mod drafts;
pub mod init;
pub mod models;
pub mod settings;
pub mod submissions;

pub use init::*;
pub use models::*;
