use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::debug::{DebugBackend, DebugLaunch, LaunchStore, NativeDebugger, SessionEvent};
use super::env::{build_environment, inherited_environment, Environment};
use super::error::ExecError;
use super::fs::{FileSystem, LocalFileSystem};
use super::process::drain_child;
use super::result::{ExecutionResult, ResultMode, RunState};
use crate::platform::TargetOs;
use crate::template::has_unresolved;

/// Everything needed to run one test process.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub working_directory: PathBuf,
    pub result_mode: ResultMode,
    /// Directories prepended to the dynamic library search path.
    pub library_paths: Vec<String>,
    /// The build system owns the executable; skip the existence check.
    pub build_system_managed: bool,
    pub debug: bool,
    /// Launch profile to use when debugging.
    pub launch_name: Option<String>,
}

impl RunRequest {
    pub fn new(command: Vec<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            command,
            working_directory: working_directory.into(),
            result_mode: ResultMode::CapturedOutput,
            library_paths: Vec::new(),
            build_system_managed: false,
            debug: false,
            launch_name: None,
        }
    }

    pub fn with_result_mode(mut self, mode: ResultMode) -> Self {
        self.result_mode = mode;
        self
    }

    pub fn with_library_paths(mut self, paths: Vec<String>) -> Self {
        self.library_paths = paths;
        self
    }

    pub fn with_debug(mut self, launch_name: Option<String>) -> Self {
        self.debug = true;
        self.launch_name = launch_name;
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

/// Output gathered while a process or session ran.
struct Captured {
    lines: Vec<String>,
    exit_code: Option<i32>,
    cancelled: bool,
}

/// Runs test processes and turns their output into [`ExecutionResult`]s.
///
/// One orchestrator may serve many runs; each call to [`run`](Self::run)
/// launches exactly one process or debug session and awaits it.
pub struct Orchestrator {
    fs: Arc<dyn FileSystem>,
    debugger: Arc<dyn DebugBackend>,
    launches: LaunchStore,
    os: TargetOs,
    base_env: Option<Environment>,
}

impl Orchestrator {
    /// Orchestrator using the local disk and the native debugger.
    pub fn new(launches: LaunchStore) -> Self {
        Self {
            fs: Arc::new(LocalFileSystem),
            debugger: Arc::new(NativeDebugger::new()),
            launches,
            os: TargetOs::host(),
            base_env: None,
        }
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_debugger(mut self, debugger: Arc<dyn DebugBackend>) -> Self {
        self.debugger = debugger;
        self
    }

    /// Use `env` instead of this process's environment as the base for children.
    pub fn with_base_environment(mut self, env: Environment) -> Self {
        self.base_env = Some(env);
        self
    }

    /// Runs `request` to completion and reports its result to `on_result`
    /// exactly once.
    pub async fn run_with<F>(&self, request: &RunRequest, cancel: &CancelToken, on_result: F)
    where
        F: FnOnce(String, Option<i32>),
    {
        let result = self.run(request, cancel).await;
        on_result(result.text, result.exit_code);
    }

    /// Runs `request` to completion.
    ///
    /// Never fails: launch and collection problems become a
    /// [`RunState::Failed`] result whose text describes the problem.
    pub async fn run(&self, request: &RunRequest, cancel: &CancelToken) -> ExecutionResult {
        let mut state = RunState::Idle;
        transition(&mut state, RunState::Launching);

        let (program, args) = match request.command.split_first() {
            Some((program, args)) => (self.os.normalize_separators(program), args),
            None => return self.fail(&mut state, ExecError::EmptyCommand, None),
        };

        if has_unresolved(&program) {
            return self.fail(&mut state, ExecError::UnresolvedProgram(program), None);
        }

        if !request.build_system_managed {
            if let Err(e) = check_executable(&program, &request.working_directory) {
                return self.fail(&mut state, e, None);
            }
        }

        let base = match &self.base_env {
            Some(env) => env.clone(),
            None => inherited_environment(),
        };
        let env = build_environment(&base, &request.library_paths, self.os);

        if let ResultMode::ResultFile(path) = &request.result_mode {
            if let Err(e) = self.fs.remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Could not remove stale result file");
            }
        }

        if cancel.is_cancelled() {
            transition(&mut state, RunState::Cancelled);
            return ExecutionResult::cancelled(String::new(), None);
        }

        transition(&mut state, RunState::Running);
        let log_only = matches!(request.result_mode, ResultMode::ResultFile(_));
        let captured = if request.debug {
            self.run_debug(request, &program, args, env, log_only, cancel)
                .await
        } else {
            self.run_direct(request, &program, args, &env, log_only, cancel)
                .await
        };
        let captured = match captured {
            Ok(captured) => captured,
            Err(e) => return self.fail(&mut state, e, None),
        };

        transition(&mut state, RunState::Collecting);
        let text = match &request.result_mode {
            ResultMode::CapturedOutput => Ok(captured.lines.join("\n")),
            ResultMode::ResultFile(path) => self.read_result_file(path, captured.exit_code).await,
        };

        match (text, captured.cancelled) {
            (Ok(text), false) => {
                transition(&mut state, RunState::Completed);
                ExecutionResult::completed(text, captured.exit_code)
            }
            (Ok(text), true) => {
                transition(&mut state, RunState::Cancelled);
                ExecutionResult::cancelled(text, captured.exit_code)
            }
            (Err(e), true) => {
                transition(&mut state, RunState::Cancelled);
                ExecutionResult::cancelled(e.to_string(), captured.exit_code)
            }
            (Err(e), false) => self.fail(&mut state, e, captured.exit_code),
        }
    }

    async fn run_direct(
        &self,
        request: &RunRequest,
        program: &str,
        args: &[String],
        env: &Environment,
        log_only: bool,
        cancel: &CancelToken,
    ) -> Result<Captured, ExecError> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&request.working_directory)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::spawn(program, e))?;

        let mut lines = Vec::new();
        let cancelled = drain_child(
            &mut child,
            |line| collect_line(&mut lines, line, log_only),
            cancel.cancelled(),
        )
        .await;

        let status = child.wait().await.map_err(|source| ExecError::Wait {
            program: program.to_string(),
            source,
        })?;

        Ok(Captured {
            lines,
            exit_code: status.code(),
            cancelled,
        })
    }

    async fn run_debug(
        &self,
        request: &RunRequest,
        program: &str,
        args: &[String],
        env: Environment,
        log_only: bool,
        cancel: &CancelToken,
    ) -> Result<Captured, ExecError> {
        let profile = self.launches.resolve(request.launch_name.as_deref(), self.os);
        let launch = DebugLaunch {
            profile,
            program: program.to_string(),
            args: args.to_vec(),
            cwd: request.working_directory.clone(),
            env,
        };

        let mut events = self.debugger.subscribe();
        let mut session = self.debugger.start(launch).await?;
        debug!(session = session.id, name = %session.name, kind = %session.kind, "Debug session started");

        let mut lines = Vec::new();
        let mut output_open = true;
        let mut cancelled = false;
        let stop = cancel.cancelled();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                line = session.next_output(), if output_open => match line {
                    Some(line) => collect_line(&mut lines, line, log_only),
                    None => output_open = false,
                },
                event = events.recv() => match event {
                    Ok(event) if event.belongs_to(&session) => {
                        if matches!(event, SessionEvent::Terminated { .. }) {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Missed debug session events");
                    }
                    Err(RecvError::Closed) => {
                        return Err(ExecError::Debugger(
                            "debugger stopped publishing session events".to_string(),
                        ));
                    }
                },
                _ = &mut stop, if !cancelled => {
                    cancelled = true;
                    session.terminate();
                }
            }
        }

        for line in session.drain_output() {
            collect_line(&mut lines, line, log_only);
        }
        drop(session);

        Ok(Captured {
            lines,
            exit_code: None,
            cancelled,
        })
    }

    async fn read_result_file(
        &self,
        path: &Path,
        exit_code: Option<i32>,
    ) -> Result<String, ExecError> {
        if !self.fs.exists(path).await {
            return Err(ExecError::MissingResultFile {
                path: path.to_path_buf(),
                exit_code,
            });
        }
        self.fs
            .read_to_string(path)
            .await
            .map_err(|source| ExecError::ResultFile {
                path: path.to_path_buf(),
                source,
            })
    }

    fn fail(&self, state: &mut RunState, error: ExecError, exit_code: Option<i32>) -> ExecutionResult {
        warn!(error = %error, "Test run failed");
        transition(state, RunState::Failed);
        ExecutionResult::failed(error.to_string(), exit_code)
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!(from = %state, to = %next, "Run state");
    *state = next;
}

fn collect_line(lines: &mut Vec<String>, line: String, log_only: bool) {
    if log_only {
        info!(target: "ctrun::output", "{line}");
    } else {
        lines.push(line);
    }
}

/// Checks that `program` can be launched from `cwd`.
///
/// Paths with a directory component are checked on disk (relative ones
/// against `cwd`); bare names are looked up on `PATH`, then in `cwd`.
pub fn check_executable(program: &str, cwd: &Path) -> Result<(), ExecError> {
    let path = Path::new(program);
    let has_dir = path.is_absolute() || path.components().count() > 1;

    let found = if has_dir {
        if path.is_absolute() {
            path.exists()
        } else {
            cwd.join(path).exists()
        }
    } else {
        which::which(program).is_ok() || cwd.join(program).exists()
    };

    if found {
        Ok(())
    } else {
        Err(ExecError::MissingExecutable(program.to_string()))
    }
}
