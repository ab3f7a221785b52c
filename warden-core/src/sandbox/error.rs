//! Sandbox error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Sandbox image not found: {0}")]
    ImageMissing(String),

    #[error("Failed to create PTY: {0}")]
    CreateFailed(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Failed to remove sandbox {name}: {message}")]
    RemoveFailed { name: String, message: String },

    #[error("Sandbox I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
