//! Running the external build tool
//!
//! Children get a search path with the toolchain directories in front of
//! `PATH` and a fixed `C` locale so that diagnostics are parseable. The
//! call blocks until the child exits; there is no timeout.

pub mod serial;

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Locale forced onto every child
pub const CHILD_LOCALE: &str = "C";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child ended without an exit code (killed by a signal)
    #[error("{program} terminated without an exit status ({status})")]
    NoExitStatus { program: String, status: ExitStatus },

    #[error("Invalid search path: {0}")]
    SearchPath(#[from] env::JoinPathsError),
}

impl ExecError {
    /// Process exit code the tool reports for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::Spawn { .. } => 127,
            ExecError::NoExitStatus { .. } | ExecError::SearchPath(_) => 1,
        }
    }
}

/// Output captured from a finished child
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Spawns tools with the toolchain directories on the search path
#[derive(Debug, Clone, Default)]
pub struct Executor {
    /// Auxiliary commands (`build.usr.bin.path`)
    pub cmds_path: Option<PathBuf>,
    /// Compiler binaries (`build.compiler.path`)
    pub compiler_path: Option<PathBuf>,
    /// Uploader binaries (`build.uploader.path`)
    pub uploader_path: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl Executor {
    pub fn new(
        cmds_path: Option<PathBuf>,
        compiler_path: Option<PathBuf>,
        uploader_path: Option<PathBuf>,
    ) -> Self {
        Self {
            cmds_path,
            compiler_path,
            uploader_path,
            envs: Vec::new(),
        }
    }

    /// Sets an extra environment variable for every child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// `PATH` for children: uploader, compiler, then auxiliary commands
    /// ahead of the inherited search path.
    pub fn search_path(&self) -> Result<OsString, ExecError> {
        let inherited = env::var_os("PATH").unwrap_or_default();
        let mut dirs: Vec<PathBuf> = env::split_paths(&inherited).collect();

        for extra in [&self.cmds_path, &self.compiler_path, &self.uploader_path]
            .into_iter()
            .flatten()
        {
            dirs.insert(0, extra.clone());
        }

        Ok(env::join_paths(dirs)?)
    }

    fn command(&self, program: &str, args: &[String]) -> Result<Command, ExecError> {
        let path = self.search_path()?;
        debug!(path = ?path, "Child search path");
        info!("{} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args).env("PATH", path).env("LANG", CHILD_LOCALE);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        Ok(cmd)
    }

    /// Runs `program` with captured output
    pub fn run_captured(&self, program: &str, args: &[String]) -> Result<ExecOutput, ExecError> {
        let output = self
            .command(program, args)?
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let code = exit_code(program, output.status)?;
        Ok(ExecOutput {
            code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Runs `program` attached to this process's streams
    pub fn run_inherited(&self, program: &str, args: &[String]) -> Result<i32, ExecError> {
        let status = self
            .command(program, args)?
            .status()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        exit_code(program, status)
    }
}

fn exit_code(program: &str, status: ExitStatus) -> Result<i32, ExecError> {
    match status.code() {
        Some(code) => {
            if code != 0 {
                warn!(program, code, "Command failed");
            }
            Ok(code)
        }
        None => Err(ExecError::NoExitStatus {
            program: program.to_string(),
            status,
        }),
    }
}
