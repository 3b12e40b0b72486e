use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// The pipes of a freshly spawned plugin.
///
/// `stdin` is the host's write side, `stdout` the host's read side. The
/// child's stderr is inherited so plugin diagnostics reach the host terminal.
#[derive(Debug)]
pub struct ProcessStreams {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// A spawned plugin process.
#[derive(Debug)]
pub struct PluginProcess {
    child: Child,
    path: PathBuf,
}

impl PluginProcess {
    /// Spawn `path` with `args`, piping its stdin and stdout.
    pub fn spawn<I, S>(path: impl AsRef<Path>, args: I) -> Result<(Self, ProcessStreams)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = path.as_ref().to_path_buf();
        let mut child = Command::new(&path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                path: path.clone(),
                source,
            })?;

        let streams = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => ProcessStreams { stdin, stdout },
            (stdin, _) => {
                // Do not leave an orphan behind when the pipes are unusable.
                let _ = child.kill();
                let _ = child.wait();
                let missing = if stdin.is_none() { "stdin" } else { "stdout" };
                return Err(TransportError::MissingPipe(missing));
            }
        };

        info!(path = %path.display(), pid = child.id(), "spawned plugin process");
        Ok((Self { child, path }, streams))
    }

    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Path of the executable this process was spawned from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forcibly terminate the child.
    ///
    /// Killing a child that has already exited is not an error.
    pub fn kill(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => {
                debug!(path = %self.path.display(), "killed plugin process");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Wait for the child to exit (blocking).
    pub fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait()?)
    }

    /// Return the exit status if the child has already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }
}
