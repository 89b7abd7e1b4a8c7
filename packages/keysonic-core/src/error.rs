//! # Error Types
//!
//! This module defines the error types for the Keysonic core.
//!
//! The musical core itself (pitch mapping, composing, capture, playback) never fails:
//! every lookup there has an explicit fallback. Errors only exist at the edges where
//! outside data enters the system.
//!
//! ## Error Types
//! - `ConfigError` - Invalid YAML configuration
//! - `StorageError` - A storage backend could not read or write a key
//! - `BundleError` - An export bundle could not be parsed or belongs to another app
//!
//! ## Usage
//! ```rust
//! use keysonic::{KeysonicConfig, KeysonicError};
//!
//! match KeysonicConfig::from_yaml("composer:\n  meter: 5/4\n") {
//!     Ok(config) => println!("tempo {}", config.tempo),
//!     Err(KeysonicError::ConfigError(message)) => eprintln!("bad config: {}", message),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeysonicError {
    /// Invalid configuration.
    ///
    /// # Example
    /// ```
    /// # use keysonic::KeysonicError;
    /// let err = KeysonicError::ConfigError("meter must be 4/4 or 3/4".to_string());
    /// assert_eq!(err.to_string(), "Invalid configuration: meter must be 4/4 or 3/4");
    /// ```
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A storage backend failed for a key.
    ///
    /// Recording stores swallow these and fall back to an empty list; they are
    /// surfaced only by the backends themselves.
    #[error("Storage error for '{key}': {message}")]
    StorageError { key: String, message: String },

    /// Export bundle could not be imported.
    ///
    /// # Example
    /// ```
    /// # use keysonic::KeysonicError;
    /// let err = KeysonicError::BundleError("unsupported version 9".to_string());
    /// assert_eq!(err.to_string(), "Invalid export bundle: unsupported version 9");
    /// ```
    #[error("Invalid export bundle: {0}")]
    BundleError(String),
}
