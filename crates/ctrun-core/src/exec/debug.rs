//! Running a test under a debugger.
//!
//! A [`DebugBackend`] starts debug sessions and announces their lifecycle on a
//! broadcast channel. The orchestrator subscribes before starting a session
//! and waits for the [`SessionEvent::Terminated`] event that belongs to it.
//! Output of a session travels through the [`DebugSession`] handle, so it is
//! released together with the handle.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::env::Environment;
use super::error::ExecError;
use super::process::drain_child;
use crate::config::{DEFAULT_LAUNCH_NAME, DEFAULT_LAUNCH_REQUEST};
use crate::platform::TargetOs;

/// A named debugger launch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchProfile {
    pub name: String,

    /// Debugger backend type, e.g. `gdb` or `lldb`.
    #[serde(rename = "type")]
    pub kind: String,

    pub request: String,

    /// Break in `main` before running.
    pub stop_at_entry: bool,

    /// Debugger binary; defaults to the backend type looked up on `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debugger_path: Option<String>,

    /// Extra arguments passed to the debugger.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub debugger_args: Vec<String>,
}

impl LaunchProfile {
    /// Host-appropriate profile used when none is configured.
    pub fn native(os: TargetOs) -> Self {
        Self {
            name: DEFAULT_LAUNCH_NAME.to_string(),
            kind: os.preferred_debugger().to_string(),
            request: DEFAULT_LAUNCH_REQUEST.to_string(),
            ..Self::default()
        }
    }

    fn with_defaults(mut self, os: TargetOs) -> Self {
        if self.name.is_empty() {
            self.name = DEFAULT_LAUNCH_NAME.to_string();
        }
        if self.kind.is_empty() {
            self.kind = os.preferred_debugger().to_string();
        }
        if self.request.is_empty() {
            self.request = DEFAULT_LAUNCH_REQUEST.to_string();
        }
        self
    }
}

/// Launch profiles available to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct LaunchStore {
    profiles: Vec<LaunchProfile>,
}

impl LaunchStore {
    pub fn new(profiles: Vec<LaunchProfile>) -> Self {
        Self { profiles }
    }

    pub fn find(&self, name: &str) -> Option<&LaunchProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The named profile, or the host's native profile when the name is
    /// absent or unknown.
    pub fn resolve(&self, name: Option<&str>, os: TargetOs) -> LaunchProfile {
        match name.filter(|n| !n.is_empty()).and_then(|n| self.find(n)) {
            Some(profile) => profile.clone().with_defaults(os),
            None => LaunchProfile::native(os),
        }
    }
}

/// A launch profile with the program to debug injected.
#[derive(Debug, Clone)]
pub struct DebugLaunch {
    pub profile: LaunchProfile,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Environment,
}

/// Lifecycle notification published by a [`DebugBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started {
        id: u64,
        name: String,
        kind: String,
    },
    Terminated {
        id: u64,
        name: String,
        kind: String,
    },
}

impl SessionEvent {
    pub fn id(&self) -> u64 {
        match self {
            SessionEvent::Started { id, .. } | SessionEvent::Terminated { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SessionEvent::Started { name, .. } | SessionEvent::Terminated { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            SessionEvent::Started { kind, .. } | SessionEvent::Terminated { kind, .. } => kind,
        }
    }

    /// True if the event belongs to `session`.
    pub fn belongs_to(&self, session: &DebugSession) -> bool {
        self.id() == session.id && self.name() == session.name && self.kind() == session.kind
    }
}

/// Handle to a running debug session.
#[derive(Debug)]
pub struct DebugSession {
    pub id: u64,
    pub name: String,
    pub kind: String,
    output: mpsc::UnboundedReceiver<String>,
    terminate: Option<oneshot::Sender<()>>,
}

impl DebugSession {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        kind: impl Into<String>,
        output: mpsc::UnboundedReceiver<String>,
        terminate: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: kind.into(),
            output,
            terminate: Some(terminate),
        }
    }

    /// Next output line; `None` once the session stops producing output.
    pub async fn next_output(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// Output lines already buffered, without waiting.
    pub fn drain_output(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.output.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Asks the backend to stop the session. Subsequent calls do nothing.
    pub fn terminate(&mut self) {
        if let Some(tx) = self.terminate.take() {
            let _ = tx.send(());
        }
    }
}

/// Something that can run a program under a debugger.
#[async_trait]
pub trait DebugBackend: Send + Sync {
    /// Lifecycle events of every session started by this backend.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Starts a session. Output and termination are reported asynchronously.
    async fn start(&self, launch: DebugLaunch) -> Result<DebugSession, ExecError>;
}

const EVENT_CAPACITY: usize = 64;

/// Runs `gdb` or `lldb` in batch mode against the test program.
pub struct NativeDebugger {
    events: broadcast::Sender<SessionEvent>,
    next_id: AtomicU64,
}

impl Default for NativeDebugger {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeDebugger {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            next_id: AtomicU64::new(1),
        }
    }

    /// Debugger program and arguments for a launch.
    pub fn command_line(launch: &DebugLaunch) -> Result<(String, Vec<String>), ExecError> {
        let profile = &launch.profile;
        let program = profile
            .debugger_path
            .clone()
            .unwrap_or_else(|| profile.kind.clone());

        let mut args: Vec<String> = Vec::new();
        match profile.kind.as_str() {
            "gdb" => {
                args.extend(["-q", "-batch"].map(String::from));
                if profile.stop_at_entry {
                    args.extend(["-ex", "break main"].map(String::from));
                }
                args.extend(["-ex", "run", "-ex", "bt"].map(String::from));
                args.extend(profile.debugger_args.iter().cloned());
                args.push("--args".to_string());
            }
            "lldb" => {
                args.push("--batch".to_string());
                if profile.stop_at_entry {
                    args.extend(["-o", "breakpoint set --name main"].map(String::from));
                }
                args.extend(["-o", "run", "-k", "bt"].map(String::from));
                args.extend(profile.debugger_args.iter().cloned());
                args.push("--".to_string());
            }
            other => {
                return Err(ExecError::Debugger(format!(
                    "unsupported debugger type '{other}'"
                )))
            }
        }
        args.push(launch.program.clone());
        args.extend(launch.args.iter().cloned());
        Ok((program, args))
    }
}

#[async_trait]
impl DebugBackend for NativeDebugger {
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn start(&self, launch: DebugLaunch) -> Result<DebugSession, ExecError> {
        let (program, args) = Self::command_line(&launch)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = launch.profile.name.clone();
        let kind = launch.profile.kind.clone();

        debug!(session = id, %name, %kind, %program, "Starting debug session");
        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&launch.cwd)
            .env_clear()
            .envs(&launch.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::spawn(&program, e))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let events = self.events.clone();

        let _ = events.send(SessionEvent::Started {
            id,
            name: name.clone(),
            kind: kind.clone(),
        });

        let (task_name, task_kind) = (name.clone(), kind.clone());
        tokio::spawn(async move {
            let stop = async move {
                // Only an explicit request stops the debugger; a dropped handle does not.
                if kill_rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            drain_child(
                &mut child,
                |line| {
                    let _ = out_tx.send(line);
                },
                stop,
            )
            .await;
            let _ = child.wait().await;
            debug!(session = id, "Debug session terminated");
            let _ = events.send(SessionEvent::Terminated {
                id,
                name: task_name,
                kind: task_kind,
            });
        });

        Ok(DebugSession::new(id, name, kind, out_rx, kill_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(kind: &str, stop_at_entry: bool) -> DebugLaunch {
        DebugLaunch {
            profile: LaunchProfile {
                name: "t".to_string(),
                kind: kind.to_string(),
                stop_at_entry,
                ..LaunchProfile::default()
            },
            program: "/b/tests".to_string(),
            args: vec!["--run".to_string(), "A::b".to_string()],
            cwd: PathBuf::from("/b"),
            env: Environment::new(),
        }
    }

    #[test]
    fn test_gdb_command_line() {
        let (program, args) = NativeDebugger::command_line(&launch("gdb", true)).unwrap();
        assert_eq!(program, "gdb");
        assert_eq!(args[..4], ["-q", "-batch", "-ex", "break main"]);
        assert_eq!(args[args.len() - 4..], ["--args", "/b/tests", "--run", "A::b"]);
    }

    #[test]
    fn test_lldb_command_line() {
        let (program, args) = NativeDebugger::command_line(&launch("lldb", false)).unwrap();
        assert_eq!(program, "lldb");
        assert!(!args.iter().any(|a| a.contains("breakpoint")));
        assert_eq!(args[args.len() - 4..], ["--", "/b/tests", "--run", "A::b"]);
    }

    #[test]
    fn test_unsupported_debugger() {
        assert!(matches!(
            NativeDebugger::command_line(&launch("windbg", false)),
            Err(ExecError::Debugger(_))
        ));
    }

    #[test]
    fn test_launch_store_resolve() {
        let store = LaunchStore::new(vec![LaunchProfile {
            name: "mine".to_string(),
            kind: "lldb".to_string(),
            ..LaunchProfile::default()
        }]);

        let found = store.resolve(Some("mine"), TargetOs::Linux);
        assert_eq!(found.kind, "lldb");
        assert_eq!(found.request, DEFAULT_LAUNCH_REQUEST);

        let fallback = store.resolve(Some("missing"), TargetOs::Linux);
        assert_eq!(fallback.name, DEFAULT_LAUNCH_NAME);
        assert_eq!(fallback.kind, "gdb");

        assert_eq!(store.resolve(None, TargetOs::MacOs).kind, "lldb");
    }
}
