//! Stuff common to all the flash operations

use std::{fmt::Display, path::PathBuf};

use fwu_config::FlashProfile;

/// A single flash attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRequest {
    pub profile: FlashProfile,
    pub firmware: PathBuf,
    pub port: String,
}

impl FlashRequest {
    pub fn new(profile: FlashProfile, firmware: impl Into<PathBuf>, port: impl Into<String>) -> Self {
        Self {
            profile,
            firmware: firmware.into(),
            port: port.into(),
        }
    }
}

/// Output stream of the flashing tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A chunk of tool output, delivered while the tool is running.
///
/// `sequence` is shared by both streams and strictly increases in the order chunks arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub stream: StreamKind,
    pub text: String,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Reason of a failed flash attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedTool,
    InvalidProfile,
    ToolScriptMissing,
    InterpreterNotFound,
    FirmwareNotFound,
    SpawnError,
    /// Tool exited with a non-zero code, or was killed by a signal (`None`)
    NonZeroExit(Option<i32>),
    Cancelled,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::UnsupportedTool => f.write_str("Unsupported tool"),
            ErrorKind::InvalidProfile => f.write_str("Invalid project profile"),
            ErrorKind::ToolScriptMissing => f.write_str("Bundled tool script not found"),
            ErrorKind::InterpreterNotFound => f.write_str("Interpreter not found"),
            ErrorKind::FirmwareNotFound => f.write_str("Firmware file not found"),
            ErrorKind::SpawnError => f.write_str("Failed to start flash process"),
            ErrorKind::NonZeroExit(Some(x)) => write!(f, "Flash failed with exit code {x}"),
            ErrorKind::NonZeroExit(None) => f.write_str("Flash process was terminated by a signal"),
            ErrorKind::Cancelled => f.write_str("Flash aborted"),
        }
    }
}

/// Terminal result of a flash attempt. Exactly one is produced per accepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashResult {
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub captured_output: Vec<OutputEvent>,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

impl FlashResult {
    pub(crate) fn success(captured_output: Vec<OutputEvent>) -> Self {
        Self {
            outcome: Outcome::Success,
            exit_code: Some(0),
            captured_output,
            error_kind: None,
            error_detail: None,
        }
    }

    pub(crate) fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failure,
            exit_code: None,
            captured_output: Vec::new(),
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
        }
    }

    pub(crate) fn with_output(mut self, captured_output: Vec<OutputEvent>) -> Self {
        self.captured_output = captured_output;
        self
    }

    pub(crate) fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    /// All captured text of one stream, in arrival order.
    pub fn text(&self, stream: StreamKind) -> String {
        self.captured_output
            .iter()
            .filter(|x| x.stream == stream)
            .map(|x| x.text.as_str())
            .collect()
    }

    /// All captured text of both streams, in arrival order.
    pub fn combined_text(&self) -> String {
        self.captured_output.iter().map(|x| x.text.as_str()).collect()
    }
}

impl Display for FlashResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.error_kind, &self.error_detail) {
            (None, _) => f.write_str("Flash complete"),
            (Some(kind), Some(detail)) if !detail.is_empty() => write!(f, "{kind}: {detail}"),
            (Some(kind), _) => kind.fmt(f),
        }
    }
}

/// States a flash attempt goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashState {
    #[default]
    Idle,
    ProfileResolved,
    PreflightChecked,
    Spawned,
    Streaming,
    Terminated(Outcome),
}

impl FlashState {
    pub const fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle | Self::Terminated(_))
    }
}
