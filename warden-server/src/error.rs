//! Server error types

use thiserror::Error;

/// Errors that can occur in the warden server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
