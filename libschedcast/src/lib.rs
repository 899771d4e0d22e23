//! Schedcast - scheduled-post delivery for social networks
//!
//! This library provides the core pipeline behind the Schedcast tools: a
//! durable queue of scheduled posts, the calendar events mirroring them,
//! per-network OAuth credentials, and the sweeper that delivers due posts.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod networks;
pub mod oauth;
pub mod scheduling;
pub mod service;
pub mod stats;
pub mod sweeper;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{Result, SchedcastError};
pub use sweeper::{PassSummary, Sweeper};
pub use types::{Credential, Event, Network, PendingPost, PostPayload};
