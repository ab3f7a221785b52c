//! Handle to one launched sandbox process
//!
//! A launched process is split in two halves: [`ProcessControl`] stays with the
//! broker (kill, reap) while [`ProcessIo`] goes to the session supervisor that
//! pumps terminal bytes and applies resizes.

use std::fmt;
use std::io::{Read, Write};

use portable_pty::{Child, MasterPty, PtySize};

use super::SandboxError;

/// A freshly launched sandboxed shell attached to a PTY
pub struct SandboxProcess {
    pub name: String,
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
}

impl SandboxProcess {
    /// Wrap a spawned PTY child, taking its reader and writer
    pub(crate) fn from_pty(
        name: String,
        master: Box<dyn MasterPty + Send>,
        child: Box<dyn Child + Send + Sync>,
    ) -> Result<Self, SandboxError> {
        let reader = master
            .try_clone_reader()
            .map_err(|e| SandboxError::IoError(std::io::Error::other(e)))?;
        let writer = master
            .take_writer()
            .map_err(|e| SandboxError::IoError(std::io::Error::other(e)))?;

        Ok(Self {
            name,
            master,
            child,
            reader,
            writer,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Split into the broker-owned control half and the supervisor-owned I/O half
    pub fn into_parts(self) -> (ProcessControl, ProcessIo) {
        let control = ProcessControl {
            name: self.name,
            child: self.child,
        };
        let io = ProcessIo {
            reader: self.reader,
            writer: self.writer,
            resizer: PtyResizer {
                master: self.master,
            },
        };
        (control, io)
    }
}

impl fmt::Debug for SandboxProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxProcess")
            .field("name", &self.name)
            .field("pid", &self.pid())
            .finish()
    }
}

/// Lifecycle half of a sandbox process
pub struct ProcessControl {
    name: String,
    child: Box<dyn Child + Send + Sync>,
}

impl ProcessControl {
    /// Sandbox instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kill the process and wait for it, tolerating a process that already exited.
    ///
    /// Blocking; run it on a blocking thread.
    pub fn kill_and_reap(mut self) -> std::io::Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!(name = %self.name, ?status, "Sandbox process already exited");
            return Ok(());
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!(name = %self.name, error = %e, "Kill failed, process likely gone");
        }
        self.child.wait().map(|_| ())
    }
}

impl fmt::Debug for ProcessControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessControl")
            .field("name", &self.name)
            .finish()
    }
}

/// Terminal I/O half of a sandbox process
pub struct ProcessIo {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub resizer: PtyResizer,
}

impl fmt::Debug for ProcessIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessIo").finish_non_exhaustive()
    }
}

/// Owns the PTY master; changes terminal geometry
pub struct PtyResizer {
    master: Box<dyn MasterPty + Send>,
}

impl PtyResizer {
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), SandboxError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SandboxError::IoError(std::io::Error::other(e)))
    }

    /// Current (cols, rows) of the PTY
    pub fn size(&self) -> Result<(u16, u16), SandboxError> {
        self.master
            .get_size()
            .map(|size| (size.cols, size.rows))
            .map_err(|e| SandboxError::IoError(std::io::Error::other(e)))
    }
}
