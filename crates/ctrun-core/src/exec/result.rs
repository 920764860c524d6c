use std::fmt;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Where the result text of a run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultMode {
    /// Combined stdout and stderr, joined with `\n`.
    CapturedOutput,
    /// A file the test binary writes. Process output is only logged.
    ResultFile(PathBuf),
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Launching,
    Running,
    Collecting,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Launching => "launching",
            RunState::Running => "running",
            RunState::Collecting => "collecting",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one run. `text` is always present, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub text: String,
    pub exit_code: Option<i32>,
    pub state: RunState,
}

impl ExecutionResult {
    pub fn completed(text: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            text: text.into(),
            exit_code,
            state: RunState::Completed,
        }
    }

    /// A run that could not produce a result; `diagnostic` explains why.
    pub fn failed(diagnostic: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            text: diagnostic.into(),
            exit_code,
            state: RunState::Failed,
        }
    }

    pub fn cancelled(text: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            text: text.into(),
            exit_code,
            state: RunState::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == RunState::Cancelled
    }
}

/// Rule deciding whether a finished run passed.
#[derive(Debug, Clone)]
pub enum PassPolicy {
    /// Exit code 0 passes.
    ExitCode,
    /// The result text must match.
    SuccessPattern(Regex),
}

/// Classification of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(String),
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

impl PassPolicy {
    pub fn verdict(&self, result: &ExecutionResult) -> Verdict {
        if result.state == RunState::Failed {
            return Verdict::Failed(result.text.clone());
        }

        match self {
            PassPolicy::ExitCode => match result.exit_code {
                Some(0) => Verdict::Passed,
                Some(code) => Verdict::Failed(with_output(
                    format!("Test exited with code {code}"),
                    &result.text,
                )),
                None => Verdict::Failed(with_output(
                    "Test terminated without an exit code".to_string(),
                    &result.text,
                )),
            },
            PassPolicy::SuccessPattern(re) => {
                if re.is_match(&result.text) {
                    Verdict::Passed
                } else {
                    Verdict::Failed(with_output(
                        format!("Result did not match /{}/", re.as_str()),
                        &result.text,
                    ))
                }
            }
        }
    }
}

fn with_output(headline: String, text: &str) -> String {
    if text.is_empty() {
        headline
    } else {
        format!("{headline}\n{text}")
    }
}
