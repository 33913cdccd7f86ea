//! Devline DeviantArt - DeviantArt crawler
//!
//! This crate provides the API client, response models, row transforms
//! and the resumable crawl runners that collect DeviantArt users,
//! their social graph and their galleries.

pub mod about;
pub mod api;
pub mod auth;
pub mod config;
pub mod crawl;
pub mod model;
pub mod state;
pub mod stats;
pub mod transform;

// Re-exports
pub use api::{ApiClient, DeviantApi};
pub use auth::{Credentials, TokenManager};
pub use config::{ApiSettings, CrawlConfig, Pacing};
pub use state::{CrawlKind, Dataset};
pub use stats::CrawlStats;
