//! Locating a usable interpreter or tool on the host.

use std::{ffi::OsString, process::Stdio, time::Duration};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

/// Time a candidate gets to answer a version check.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health check for a candidate command.
pub trait Probe: Send + Sync {
    /// `true` if `command` can be executed. Must not hang indefinitely.
    fn probe<'a>(&'a self, command: &'a str) -> BoxFuture<'a, bool>;
}

/// Runs `<command> --version` and checks for a successful exit within a timeout.
#[derive(Debug, Clone)]
pub struct VersionProbe {
    timeout: Duration,
    env: Vec<(OsString, OsString)>,
}

impl VersionProbe {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            env: Vec::new(),
        }
    }

    /// Environment additions for the probe process, such as an augmented `PATH`.
    pub fn with_env(mut self, env: Vec<(OsString, OsString)>) -> Self {
        self.env = env;
        self
    }
}

impl Default for VersionProbe {
    fn default() -> Self {
        Self::new(PROBE_TIMEOUT)
    }
}

impl Probe for VersionProbe {
    fn probe<'a>(&'a self, command: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let child = tokio::process::Command::new(command)
                .arg("--version")
                .envs(self.env.iter().map(|(k, v)| (k, v)))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn();

            let mut child = match child {
                Ok(x) => x,
                Err(e) => {
                    debug!("Cannot run {command}: {e}");
                    return false;
                }
            };

            match tokio::time::timeout(self.timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("{command} --version exited with {status}");
                    status.success()
                }
                Ok(Err(e)) => {
                    debug!("Failed to wait for {command}: {e}");
                    false
                }
                Err(_) => {
                    warn!("{command} did not respond within {:?}", self.timeout);
                    let _ = child.kill().await;
                    false
                }
            }
        })
    }
}

/// First candidate for which `probe` succeeds, trying them in order.
///
/// Failing candidates are skipped. `None` only when all of them fail.
pub async fn locate<S, P>(candidates: &[S], probe: &P) -> Option<String>
where
    S: AsRef<str>,
    P: Probe + ?Sized,
{
    for candidate in candidates.iter().map(AsRef::as_ref) {
        if probe.probe(candidate).await {
            info!("Using {candidate}");
            return Some(candidate.to_string());
        }
        debug!("Skipping {candidate}");
    }

    None
}

/// Python interpreters to try, in order, on the current platform.
pub fn default_interpreter_candidates() -> Vec<String> {
    let candidates: &[&str] = if cfg!(windows) {
        &["py", "python", "python3"]
    } else {
        &["python3", "python", "/usr/bin/python3", "/usr/bin/python"]
    };

    candidates.iter().map(|x| x.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Accepts a fixed set of commands and records what was asked.
    struct FixedProbe {
        ok: &'static [&'static str],
        asked: Mutex<Vec<String>>,
    }

    impl FixedProbe {
        fn new(ok: &'static [&'static str]) -> Self {
            Self {
                ok,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl Probe for FixedProbe {
        fn probe<'a>(&'a self, command: &'a str) -> BoxFuture<'a, bool> {
            self.asked.lock().unwrap().push(command.to_string());
            Box::pin(std::future::ready(self.ok.iter().any(|x| *x == command)))
        }
    }

    #[tokio::test]
    async fn first_working_candidate() {
        let probe = FixedProbe::new(&["python", "/usr/bin/python3"]);
        let res = locate(&["python3", "python", "/usr/bin/python3"], &probe).await;

        assert_eq!(res.as_deref(), Some("python"));
        // Stops at the first match
        assert_eq!(*probe.asked.lock().unwrap(), ["python3", "python"]);
    }

    #[tokio::test]
    async fn none_found() {
        let probe = FixedProbe::new(&[]);
        let res = locate(&["python3", "python"], &probe).await;

        assert!(res.is_none());
        assert_eq!(probe.asked.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_candidates() {
        let probe = FixedProbe::new(&["python3"]);
        assert!(locate::<&str, _>(&[], &probe).await.is_none());
    }

    #[tokio::test]
    async fn version_probe_missing_command() {
        assert!(!VersionProbe::default().probe("fwu-no-such-interpreter").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_probe_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow");
        std::fs::write(&script, "#!/bin/sh\nsleep 10\n").unwrap();

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let probe = VersionProbe::new(Duration::from_millis(200));
        let start = std::time::Instant::now();

        assert!(!probe.probe(script.to_str().unwrap()).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn default_candidates_not_empty() {
        assert!(!default_interpreter_candidates().is_empty());
    }
}
