use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One test as declared by an `add_test` command, plus whatever a later
/// `set_tests_properties` block attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Name as declared; may be hierarchical (`Suite::Case`, `Suite.Case`).
    pub name: String,
    /// Binary that runs the test.
    pub executable: String,
    /// Arguments passed to the executable, in order.
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Source file declaring the test case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_full_name: Option<String>,
    /// Framework tag such as `gtest`, `catch2` or `unittestpp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_framework: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Registration file the test was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl TestDefinition {
    pub fn new(name: impl Into<String>, executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args,
            ..Self::default()
        }
    }

    /// Fully-qualified name when one was declared, otherwise the plain name.
    pub fn qualified_name(&self) -> &str {
        self.test_full_name.as_deref().unwrap_or(&self.name)
    }

    /// Executable followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.executable.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Outcome of one discovery pass. Errors never abort the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub tests: Vec<TestDefinition>,
    pub errors: Vec<String>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
