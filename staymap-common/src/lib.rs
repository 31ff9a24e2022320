//! Common types and utilities shared across Staymap crates.
//!
//! This crate defines the shared error type and the observability helpers
//! used throughout the Staymap workspace. It is intentionally lightweight
//! so that every crate can depend on it without introducing heavy
//! transitive costs.
//!
//! # Overview
//!
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`StaymapError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use staymap_common::StaymapError;
//!
//! let err = StaymapError::Selector("div[".into());
//! assert_eq!(err.to_string(), "Invalid selector: div[");
//! ```

pub mod observability;

/// Error types used across the Staymap system.
#[derive(thiserror::Error, Debug)]
pub enum StaymapError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configured CSS selector could not be parsed.
    #[error("Invalid selector: {0}")]
    Selector(String),

    /// Writing the output feed failed.
    #[error("Feed error: {0}")]
    Feed(#[from] std::io::Error),
}

/// Convenient alias for results that use [`StaymapError`].
pub type Result<T> = std::result::Result<T, StaymapError>;
