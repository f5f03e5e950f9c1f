//! Editor process launching.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Seam between the menu controller and the outside world.
///
/// The production implementation spawns the editor; tests substitute a
/// recording implementation.
pub trait Launcher: Send + Sync {
    /// Opens the given directory in the editor.
    fn launch(&self, dir: &Path) -> Result<()>;
}

/// Spawns the configured editor command with the directory as its sole
/// positional argument.
pub struct EditorLauncher {
    command: String,
}

impl EditorLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Launcher for EditorLauncher {
    fn launch(&self, dir: &Path) -> Result<()> {
        tracing::info!(command = %self.command, dir = %dir.display(), "launching editor");

        let mut child = Command::new(&self.command)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Launch {
                command: self.command.clone(),
                source: e,
            })?;

        // The child is detached: no output contract, no exit-status
        // contract. Reap it in the background so it never lingers as a
        // zombie.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(())
    }
}
