//! Process spawning used to run the flashing tools.
//!
//! [`Spawner`] is the seam between the orchestrator and the operating system. [`TokioSpawner`]
//! runs real processes; tests provide their own implementation to simulate tools.

use std::{
    ffi::{OsStr, OsString},
    fmt::Display,
    io,
    path::PathBuf,
    pin::Pin,
    process::Stdio,
};

use futures::future::BoxFuture;
use tokio::io::AsyncRead;

/// Program, arguments and environment additions of a tool run.
///
/// The spawned process inherits the environment of the current process, with `env` applied on
/// top of it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
}

impl Invocation {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

pub type OutputPipe = Pin<Box<dyn AsyncRead + Send>>;

/// A running process with captured output.
pub struct SpawnedProcess {
    pub stdout: OutputPipe,
    pub stderr: OutputPipe,
    pub handle: Box<dyn ProcessHandle>,
}

pub trait ProcessHandle: Send {
    /// Wait for the process to exit. Resolves to the exit code, or `None` if the process was
    /// terminated by a signal.
    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>>;

    /// Kill the process and wait for it to exit.
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

pub trait Spawner: Send + Sync {
    /// Start a process. Both stdout and stderr must be captured.
    fn spawn(&self, invocation: &Invocation) -> io::Result<SpawnedProcess>;
}

/// Spawns real processes using [`tokio::process`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, invocation: &Invocation) -> io::Result<SpawnedProcess> {
        let mut child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not captured"))?;

        Ok(SpawnedProcess {
            stdout: Box::pin(stdout),
            stderr: Box::pin(stderr),
            handle: Box::new(TokioChild(child)),
        })
    }
}

struct TokioChild(tokio::process::Child);

impl ProcessHandle for TokioChild {
    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>> {
        Box::pin(async move { self.0.wait().await.map(|status| status.code()) })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(self.0.kill())
    }
}

/// Per-user directory where tools such as `pipx` install executables (`~/.local/bin`).
pub fn user_local_bin() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".local").join("bin"))
}

/// `PATH` of the current process with `extra` directories prepended.
///
/// Directories already present are not added twice. Returns `None` if the result cannot be
/// represented (a directory containing the path separator).
pub fn augmented_search_path(extra: &[PathBuf]) -> Option<OsString> {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let existing: Vec<PathBuf> = std::env::split_paths(&current).collect();

    let prefix = extra
        .iter()
        .filter(|x| !existing.contains(*x))
        .cloned()
        .collect::<Vec<_>>();

    std::env::join_paths(prefix.into_iter().chain(existing)).ok()
}

pub(crate) fn search_path_env(extra: &[PathBuf]) -> Vec<(OsString, OsString)> {
    augmented_search_path(extra)
        .map(|x| vec![(OsStr::new("PATH").to_os_string(), x)])
        .unwrap_or_default()
}
