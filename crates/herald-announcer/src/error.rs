//! Error types for the announcer binary.
//!
//! [`AnnouncerError`] wraps every failure that can stop the announcer from
//! starting or shutting down cleanly. Per-tick failures never reach it;
//! the reconciliation service logs and absorbs those.

/// Top-level error for the announcer binary.
#[derive(Debug, thiserror::Error)]
pub enum AnnouncerError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: herald_core::ConfigError,
    },

    /// No bot token was supplied.
    #[error("DISCORD_TOKEN is not set")]
    MissingToken,

    /// The reconciliation service failed to open or stop.
    #[error("service error: {source}")]
    Service {
        /// The underlying service error.
        #[from]
        source: herald_core::ServiceError,
    },

    /// An HTTP client could not be built or a startup request failed.
    #[error("HTTP error: {message}")]
    Http {
        /// Description of the failure.
        message: String,
    },

    /// Discord refused the bot token or answered unexpectedly.
    #[error("Discord error: {message}")]
    Discord {
        /// Description of the failure.
        message: String,
    },

    /// Installing the shutdown signal handler failed.
    #[error("signal handler error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
