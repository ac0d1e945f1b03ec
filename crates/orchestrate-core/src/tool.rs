//! Blocking subprocess invocation for the external CLIs (`docker`, `kubectl`).
//!
//! Every call is a single `spawn` + `wait_with_output`; the orchestrator is a
//! single thread of control apart from the short-lived stdin writer, and the
//! only suspension points are these waits and the readiness poll sleep.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{OrchestrateError, Result};

/// A resolved external executable.
#[derive(Debug, Clone)]
pub struct Tool {
    program: PathBuf,
}

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr, as written to build logs.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }

    /// Short failure description: exit status plus the tail of stderr
    /// (or stdout when stderr is empty).
    pub fn failure_hint(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let tail = tail_chars(source.trim(), 500);
        if tail.is_empty() {
            status
        } else {
            format!("{status}: {tail}")
        }
    }
}

fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = count - max;
    let (idx, _) = s.char_indices().nth(skip).unwrap_or((0, ' '));
    &s[idx..]
}

impl Tool {
    /// Resolve `configured` (a bare name looked up on `PATH`, or a path).
    pub fn resolve(configured: &str) -> Result<Self> {
        let program = which::which(configured)
            .map_err(|_| OrchestrateError::ToolNotFound(configured.to_string()))?;
        Ok(Self { program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Run with `args`, optionally feeding `stdin`, and capture all output.
    ///
    /// A nonzero exit is not an error here; callers decide what it means.
    pub fn run(&self, args: &[&str], stdin: Option<&[u8]>, cwd: Option<&Path>) -> Result<ToolOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(tool = %self.program.display(), args = ?args, "running");

        let spawn_err = |e: std::io::Error| OrchestrateError::ToolSpawnFailed {
            tool: self.name(),
            reason: e.to_string(),
        };

        let mut child = cmd.spawn().map_err(spawn_err)?;
        let pipe = child.stdin.take();

        // stdin is fed from its own thread while this one drains stdout and
        // stderr, so neither side can fill a pipe and stall the other.
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match (pipe, stdin) {
                // Dropping the handle closes the pipe so the child sees EOF.
                (Some(mut pipe), Some(data)) => pipe.write_all(data),
                _ => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (output, written)
        });
        let output = output.map_err(spawn_err)?;

        // A child that exits without reading all of stdin is judged by its
        // exit status, not by the broken pipe.
        if let Err(e) = written {
            if e.kind() != ErrorKind::BrokenPipe {
                return Err(OrchestrateError::ToolSpawnFailed {
                    tool: self.name(),
                    reason: format!("failed to write stdin: {e}"),
                });
            }
            tracing::debug!(tool = %self.program.display(), "tool closed stdin early");
        }

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
