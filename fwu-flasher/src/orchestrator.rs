//! Running a flash attempt from preflight checks to the terminal [`FlashResult`].

use std::{
    ffi::OsString,
    io,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use fwu_config::{ProfileError, Tool};
use futures::{SinkExt, StreamExt, channel::mpsc};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use tracing::{debug, error, info, warn};

use crate::{
    Error, ErrorKind, FlashRequest, FlashResult, FlashState, Outcome, OutputEvent, Result,
    StreamKind,
    command::{self, ToolLayout},
    helpers::Utf8Chunker,
    process::{Invocation, ProcessHandle, SpawnedProcess, Spawner, TokioSpawner, search_path_env},
    resolver::{self, Probe, VersionProbe},
};

#[derive(Debug, Default)]
struct Session {
    state: FlashState,
    cancel: Option<CancellationToken>,
}

/// Flashes firmware using the external tools described by a [`ToolLayout`].
///
/// Only one flash can run at a time on an orchestrator. Share it (for example in an [`Arc`]) to
/// allow calling [`Orchestrator::abort`] while a flash is running.
pub struct Orchestrator {
    layout: ToolLayout,
    spawner: Arc<dyn Spawner>,
    probe: Arc<dyn Probe>,
    session: Mutex<Session>,
}

impl Orchestrator {
    /// Orchestrator running real processes. Interpreters are checked with a [`VersionProbe`].
    pub fn new(layout: ToolLayout) -> Self {
        let probe = VersionProbe::default().with_env(search_path_env(&layout.search_paths));

        Self {
            layout,
            spawner: Arc::new(TokioSpawner),
            probe: Arc::new(probe),
            session: Mutex::default(),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub const fn layout(&self) -> &ToolLayout {
        &self.layout
    }

    /// State of the current (or last) flash attempt.
    pub fn state(&self) -> FlashState {
        self.session().state
    }

    /// Abort the running flash, killing the tool if it was started. Returns `false` if nothing
    /// was running.
    pub fn abort(&self) -> bool {
        match &self.session().cancel {
            Some(token) => {
                info!("Abort requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Flash `request`, sending tool output to `chan` while the tool runs.
    ///
    /// Every accepted call produces exactly one [`FlashResult`]. A call made while another flash
    /// is running is rejected with [`Error::FlashInProgress`].
    pub async fn flash(
        &self,
        request: FlashRequest,
        chan: Option<mpsc::Sender<OutputEvent>>,
    ) -> Result<FlashResult> {
        let (guard, cancel) = self.begin()?;

        info!(
            "Flashing {} to {} using {}",
            request.firmware.display(),
            request.port,
            request.profile.tool
        );

        let res = self.run(&request, &guard, &cancel, chan).await;

        match &res.error_kind {
            None => info!("Flash successful"),
            Some(ErrorKind::Cancelled) => warn!("{res}"),
            Some(_) => error!("{res}"),
        }

        guard.finish(res.outcome);
        Ok(res)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<(InFlight<'_>, CancellationToken)> {
        let mut session = self.session();
        if session.state.is_busy() {
            return Err(Error::FlashInProgress);
        }

        let token = CancellationToken::new();
        session.state = FlashState::ProfileResolved;
        session.cancel = Some(token.clone());
        debug!("Flash state: {:?}", session.state);

        Ok((
            InFlight {
                session: &self.session,
            },
            token,
        ))
    }

    async fn run(
        &self,
        request: &FlashRequest,
        guard: &InFlight<'_>,
        cancel: &CancellationToken,
        chan: Option<mpsc::Sender<OutputEvent>>,
    ) -> FlashResult {
        let preflight = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            x = self.preflight(request) => Some(x),
        };

        let invocation = match preflight {
            Some(Ok(x)) => x,
            Some(Err(e)) => return e,
            None => return not_started(),
        };
        guard.set(FlashState::PreflightChecked);

        if cancel.is_cancelled() {
            return not_started();
        }

        info!("Running {invocation}");
        let process = match self.spawner.spawn(&invocation) {
            Ok(x) => x,
            Err(e) => {
                return FlashResult::failure(
                    ErrorKind::SpawnError,
                    format!("{}: {e}", invocation.program.to_string_lossy()),
                );
            }
        };
        guard.set(FlashState::Spawned);

        stream(process, guard, cancel, Recorder::new(chan, cancel.clone())).await
    }

    /// Checks everything that can be checked without starting the tool and builds its command
    /// line.
    async fn preflight(&self, request: &FlashRequest) -> Result<Invocation, FlashResult> {
        let profile = &request.profile;
        let args = command::tool_args(profile, &request.port, &request.firmware)
            .map_err(profile_failure)?;
        let env = search_path_env(&self.layout.search_paths);

        let invocation = match &profile.tool {
            Tool::Esptool => {
                let script = &self.layout.esptool_script;
                if !tokio::fs::try_exists(script).await.unwrap_or(false) {
                    return Err(FlashResult::failure(
                        ErrorKind::ToolScriptMissing,
                        format!("{} does not exist", script.display()),
                    ));
                }

                let candidates = &self.layout.interpreter_candidates;
                let probe = self.probe.as_ref();
                let Some(interpreter) = resolver::locate(candidates.as_slice(), probe).await else {
                    return Err(FlashResult::failure(
                        ErrorKind::InterpreterNotFound,
                        format!("Tried {}", candidates.join(", ")),
                    ));
                };

                Invocation::new(interpreter)
                    .args(std::iter::once(script.as_os_str().to_os_string()).chain(args))
            }
            Tool::Avrdude => {
                let config = self
                    .layout
                    .avrdude_config
                    .iter()
                    .flat_map(|x| [OsString::from("-C"), x.into()]);

                Invocation::new(&self.layout.avrdude).args(config.chain(args))
            }
            Tool::Other(x) => {
                return Err(profile_failure(ProfileError::UnsupportedTool(x.clone())));
            }
        };

        if let Err(e) = check_readable(&request.firmware).await {
            return Err(FlashResult::failure(
                ErrorKind::FirmwareNotFound,
                format!("{}: {e}", request.firmware.display()),
            ));
        }

        Ok(Invocation { env, ..invocation })
    }
}

fn not_started() -> FlashResult {
    FlashResult::failure(ErrorKind::Cancelled, "Aborted before the tool was started")
}

fn profile_failure(e: ProfileError) -> FlashResult {
    let kind = match e {
        ProfileError::UnsupportedTool(_) => ErrorKind::UnsupportedTool,
        _ => ErrorKind::InvalidProfile,
    };
    FlashResult::failure(kind, e.to_string())
}

async fn check_readable(path: &Path) -> io::Result<()> {
    let file = tokio::fs::File::open(path).await?;
    if file.metadata().await?.is_file() {
        Ok(())
    } else {
        Err(io::Error::other("Not a regular file"))
    }
}

/// Forward output of a spawned tool until it exits or the flash is aborted.
async fn stream(
    process: SpawnedProcess,
    guard: &InFlight<'_>,
    cancel: &CancellationToken,
    mut recorder: Recorder,
) -> FlashResult {
    let SpawnedProcess {
        stdout,
        stderr,
        mut handle,
    } = process;

    let mut output = futures::stream::select(
        ReaderStream::new(stdout).map(|x| (StreamKind::Stdout, x)),
        ReaderStream::new(stderr).map(|x| (StreamKind::Stderr, x)),
    );

    guard.set(FlashState::Streaming);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return kill(handle, recorder).await,
            chunk = output.next() => match chunk {
                Some((stream, Ok(bytes))) => recorder.push(stream, &bytes).await,
                Some((stream, Err(e))) => warn!("Failed to read {stream:?} of tool: {e}"),
                None => break,
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => None,
        x = handle.wait() => Some(x),
    };

    let Some(status) = status else {
        return kill(handle, recorder).await;
    };

    let captured = recorder.finish().await;

    match status {
        Ok(Some(0)) => FlashResult::success(captured),
        Ok(code) => {
            let res = FlashResult::failure(ErrorKind::NonZeroExit(code), "").with_output(captured);
            let stderr = res.text(StreamKind::Stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                match code {
                    Some(x) => format!("Tool exited with code {x} without error output"),
                    None => "Tool was terminated without error output".to_string(),
                }
            } else {
                stderr
            };

            FlashResult {
                error_detail: Some(detail),
                ..res.with_exit_code(code)
            }
        }
        Err(e) => FlashResult::failure(
            ErrorKind::NonZeroExit(None),
            format!("Failed to wait for tool: {e}"),
        )
        .with_output(captured),
    }
}

async fn kill(mut handle: Box<dyn ProcessHandle>, recorder: Recorder) -> FlashResult {
    info!("Killing tool");
    if let Err(e) = handle.kill().await {
        warn!("Failed to kill tool: {e}");
    }

    let captured = recorder.finish().await;
    FlashResult::failure(ErrorKind::Cancelled, "Aborted by user").with_output(captured)
}

/// Numbers, captures and forwards tool output.
///
/// Forwarding stops once `cancel` fires and the receiver is not keeping up, so a stalled
/// receiver cannot hold up an abort.
struct Recorder {
    chan: Option<mpsc::Sender<OutputEvent>>,
    cancel: CancellationToken,
    sequence: u64,
    captured: Vec<OutputEvent>,
    stdout: Utf8Chunker,
    stderr: Utf8Chunker,
}

impl Recorder {
    fn new(chan: Option<mpsc::Sender<OutputEvent>>, cancel: CancellationToken) -> Self {
        Self {
            chan,
            cancel,
            sequence: 0,
            captured: Vec::new(),
            stdout: Utf8Chunker::default(),
            stderr: Utf8Chunker::default(),
        }
    }

    async fn push(&mut self, stream: StreamKind, bytes: &[u8]) {
        let chunker = match stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        };

        if let Some(text) = chunker.push(bytes) {
            self.emit(stream, text).await;
        }
    }

    async fn emit(&mut self, stream: StreamKind, text: String) {
        debug!("{stream:?}: {}", text.trim_end());

        let event = OutputEvent {
            stream,
            text,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.captured.push(event.clone());

        if let Some(chan) = &mut self.chan {
            let sent = tokio::select! {
                biased;
                x = chan.send(event) => x.is_ok(),
                _ = self.cancel.cancelled() => {
                    debug!("Receiver not keeping up after abort. Only capturing from now on");
                    false
                }
            };

            // Receiver is gone, or stalled after an abort. Keep capturing.
            if !sent {
                self.chan = None;
            }
        }
    }

    async fn finish(mut self) -> Vec<OutputEvent> {
        for stream in [StreamKind::Stdout, StreamKind::Stderr] {
            let chunker = match stream {
                StreamKind::Stdout => std::mem::take(&mut self.stdout),
                StreamKind::Stderr => std::mem::take(&mut self.stderr),
            };

            if let Some(text) = chunker.finish() {
                self.emit(stream, text).await;
            }
        }

        self.captured
    }
}

/// Marks the session busy while alive. The session is terminated when dropped, including when
/// the flash future is dropped before completion.
struct InFlight<'a> {
    session: &'a Mutex<Session>,
}

impl InFlight<'_> {
    fn set(&self, state: FlashState) {
        debug!("Flash state: {state:?}");
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state = state;
    }

    fn finish(self, outcome: Outcome) {
        self.set(FlashState::Terminated(outcome));
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.state.is_busy() {
            session.state = FlashState::Terminated(Outcome::Failure);
        }
        session.cancel = None;
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use fwu_config::FlashProfile;

    use super::*;

    #[test]
    fn profile_failure_kinds() {
        let res = profile_failure(ProfileError::UnsupportedTool("picotool".into()));
        assert_eq!(res.error_kind, Some(ErrorKind::UnsupportedTool));

        let res = profile_failure(ProfileError::MissingField {
            tool: Tool::Esptool,
            field: "address",
        });
        assert_eq!(res.error_kind, Some(ErrorKind::InvalidProfile));
        assert_eq!(res.exit_code, None);
    }

    #[tokio::test]
    async fn recorder_sequences() {
        let mut r = Recorder::new(None, CancellationToken::new());
        r.push(StreamKind::Stdout, b"a").await;
        r.push(StreamKind::Stderr, b"b\xe2").await;
        r.push(StreamKind::Stdout, b"c").await;

        let events = r.finish().await;
        let seq: Vec<_> = events.iter().map(|x| x.sequence).collect();

        assert_eq!(seq, [0, 1, 2, 3]);
        assert_eq!(events[1].text, "b");
        assert_eq!(events[3].stream, StreamKind::Stderr);
        assert_eq!(events[3].text, "\u{fffd}");
    }

    #[tokio::test]
    async fn recorder_forwards() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut r = Recorder::new(Some(tx), CancellationToken::new());
        r.push(StreamKind::Stdout, b"Connecting...").await;
        drop(r.finish().await);

        let ev = rx.next().await.unwrap();
        assert_eq!(ev.text, "Connecting...");
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn recorder_stops_forwarding_when_cancelled() {
        let (tx, mut rx) = mpsc::channel(0);
        let cancel = CancellationToken::new();
        let mut r = Recorder::new(Some(tx), cancel.clone());

        r.push(StreamKind::Stdout, b"one").await;
        cancel.cancel();
        // Channel is full. This must not wait for the receiver.
        r.push(StreamKind::Stdout, b"two").await;
        r.push(StreamKind::Stderr, b"three").await;

        let events = r.finish().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].text, "three");

        assert_eq!(rx.next().await.unwrap().text, "one");
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn abort_when_idle() {
        let o = Orchestrator::new(ToolLayout::from_tools_dir(Path::new("tools")));
        assert!(!o.abort());
        assert_eq!(o.state(), FlashState::Idle);

        let p = FlashProfile::esptool("esp32", NonZeroU32::new(921600).unwrap(), "0x10000", None);
        let res = o
            .flash(FlashRequest::new(p, "/nonexistent/app.bin", "/dev/ttyUSB0"), None)
            .await
            .unwrap();

        assert!(!res.is_success());
        assert_eq!(o.state(), FlashState::Terminated(Outcome::Failure));
        assert!(!o.abort());
    }
}
