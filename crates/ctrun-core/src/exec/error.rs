use std::path::PathBuf;

use thiserror::Error;

/// Failures while launching or collecting a run.
///
/// These never escape the orchestrator; they become the diagnostic text of a
/// failed [`ExecutionResult`](super::ExecutionResult).
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Program has unresolved placeholders: {0}")]
    UnresolvedProgram(String),

    #[error("Test executable does not exist: {0}")]
    MissingExecutable(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Debugger failed: {0}")]
    Debugger(String),

    #[error("Result file {} was not written (exit code: {})", .path.display(), describe_code(.exit_code))]
    MissingResultFile {
        path: PathBuf,
        exit_code: Option<i32>,
    },

    #[error("Failed to read result file {}: {source}", .path.display())]
    ResultFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_result_file_names_path_and_code() {
        let err = ExecError::MissingResultFile {
            path: PathBuf::from("/b/output.vsc"),
            exit_code: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "Result file /b/output.vsc was not written (exit code: 2)"
        );
    }
}
