//! Common error types used throughout curator.
//!
//! Providers report their own failures through `anyhow`; everything that
//! crosses the orchestration boundary is funnelled into [`Error`], which
//! carries enough context for a host to derive an HTTP status code via
//! [`Error::http_status`].

use std::fmt;

use crate::ids::ItemId;

/// Common error type for curator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "item", "provider").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Progress was reported for an item that was never marked as refreshing.
    #[error("cannot update refresh progress of item {item_id} ({name}): no refresh is running")]
    RefreshNotRunning {
        /// The item the progress was reported for.
        item_id: ItemId,
        /// Display name of the item.
        name: String,
    },

    /// No metadata service can refresh items of the given kind.
    #[error("no metadata service found for item kind {0}")]
    NoMetadataService(String),

    /// A provider failed while serving a request.
    #[error("Provider error [{provider}]: {message}")]
    Provider {
        /// Name of the provider that failed.
        provider: String,
        /// Human-readable error description.
        message: String,
    },

    /// A remote image request returned something that is not an image.
    #[error("invalid image received from {url}: {content_type}")]
    InvalidImage {
        /// The URL that was requested.
        url: String,
        /// The content type that was reported (or a description of its absence).
        content_type: String,
    },

    /// The operation was cancelled by shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::InvalidImage { .. } => 404,
            Error::Validation(_) => 400,
            Error::Provider { .. } => 502,
            Error::Cancelled => 503,
            Error::RefreshNotRunning { .. } => 500,
            Error::NoMetadataService(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Provider`].
    pub fn provider(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::InvalidImage`].
    pub fn invalid_image(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Error::InvalidImage {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    /// Whether this error stems from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
