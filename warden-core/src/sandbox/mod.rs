//! Sandboxed shell processes
//!
//! Launches one resource-capped shell per session inside a PTY and removes the
//! backing sandbox instance on teardown.

mod config;
mod engine;
mod error;
mod process;

pub use config::{DEFAULT_IMAGE, DEFAULT_NAME_PREFIX, DEFAULT_SHELL, Runtime, SandboxConfig};
pub use engine::{DockerEngine, HostEngine, SandboxEngine, create_engine, is_already_removed};
pub use error::SandboxError;
pub use process::{ProcessControl, ProcessIo, PtyResizer, SandboxProcess};
