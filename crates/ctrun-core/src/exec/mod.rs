//! Process execution.
//!
//! The [`Orchestrator`] launches one test process per call, either directly
//! or under a debugger, and reconciles its result from captured output or a
//! result file. Failures never escape as errors; they are reported through
//! the [`ExecutionResult`] so that every run yields exactly one result.

mod cancel;
mod debug;
mod env;
mod error;
mod fs;
mod orchestrator;
mod process;
mod result;

pub use cancel::CancelToken;
pub use debug::{
    DebugBackend, DebugLaunch, DebugSession, LaunchProfile, LaunchStore, NativeDebugger,
    SessionEvent,
};
pub use env::{build_environment, inherited_environment, join_library_paths, Environment};
pub use error::ExecError;
pub use fs::{FileSystem, LocalFileSystem};
pub use orchestrator::{check_executable, Orchestrator, RunRequest};
pub use result::{ExecutionResult, PassPolicy, ResultMode, RunState, Verdict};
