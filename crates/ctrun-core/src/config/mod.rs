//! Configuration management for ctrun.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `ctrun.toml` file
//! 3. User config `~/.config/ctrun/config.toml`
//! 4. Built-in defaults (lowest priority)
//!
//! The raw configuration is plain data. It is turned into immutable, validated
//! [`Profile`](crate::profile::Profile) values once per activation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::exec::LaunchProfile;
use crate::profile::TargetKind;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid configuration for target '{target}': {message}")]
    InvalidTarget { target: TargetKind, message: String },
}

impl ConfigError {
    pub(crate) fn target(target: TargetKind, message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target,
            message: message.into(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace-wide settings.
    pub workspace: WorkspaceConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Build-system session shared by the managed target.
    pub cmake: CmakeConfig,

    /// Per-target-type settings.
    pub targets: TargetsConfig,

    /// Debugger launch profiles, looked up by name.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub launch: Vec<LaunchProfile>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./ctrun.toml` (project local)
    /// 2. `~/.config/ctrun/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(PROJECT_CONFIG_FILE).exists() {
            return Self::from_file(PROJECT_CONFIG_FILE);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(USER_CONFIG_DIR).join(USER_CONFIG_FILE);
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit file when given, otherwise from the default locations.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration text without consulting the environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Workspace overrides
        if let Some(root) = var("CTRUN_WORKSPACE") {
            self.workspace.root = root;
        }
        if let Some(python) = var("CTRUN_PYTHON_EXE_PATH") {
            self.workspace.python_exe_path = python;
        }
        if let Some(target) = var("CTRUN_TARGET") {
            if let Ok(kind) = target.parse() {
                self.workspace.default_target = kind;
            }
        }

        // Build session overrides
        if let Some(dir) = var("CTRUN_BUILD_DIRECTORY") {
            self.cmake.build_directory = dir;
        }
        if let Some(build_type) = var("CTRUN_BUILD_TYPE") {
            self.cmake.build_type = build_type;
        }
        if let Some(target) = var("CTRUN_CMAKE_TARGET") {
            self.cmake.target = target;
        }

        // Logging overrides
        if let Some(filter) = var("CTRUN_LOG") {
            self.logging.filter = filter;
        }
    }

    /// Settings of one target type.
    pub fn target(&self, kind: TargetKind) -> &TargetConfig {
        match kind {
            TargetKind::Primary => &self.targets.primary,
            TargetKind::Executable => &self.targets.executable,
            TargetKind::Binary => &self.targets.binary,
            TargetKind::Cmake => &self.targets.cmake,
        }
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        Config::default().to_toml_string().unwrap_or_default()
    }

    /// Render this configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Workspace-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace folder; empty means the current directory.
    pub root: String,

    /// Python interpreter used by the primary target.
    pub python_exe_path: String,

    /// Target used when the command line does not pick one.
    pub default_target: TargetKind,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            python_exe_path: String::new(),
            default_target: TargetKind::Executable,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// The build-system session (CMake build tree) used by the managed target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmakeConfig {
    /// Build tree root. May use placeholders such as `${workspaceFolder}`.
    pub build_directory: String,

    /// Active configuration (`Debug`, `Release`, ...); empty to probe.
    pub build_type: String,

    /// Build target the primary target's commands refer to.
    pub target: String,

    /// Discover tests from `CTestTestfile.cmake` instead of listing them.
    pub use_ctest_discovery: bool,

    /// Classify CTest-discovered runs by exit code.
    pub use_exit_code: bool,
}

impl Default for CmakeConfig {
    fn default() -> Self {
        Self {
            build_directory: DEFAULT_CMAKE_BUILD_DIRECTORY.to_string(),
            build_type: String::new(),
            target: String::new(),
            use_ctest_discovery: true,
            use_exit_code: true,
        }
    }
}

/// Settings for every target type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub primary: TargetConfig,
    pub executable: TargetConfig,
    pub binary: TargetConfig,
    pub cmake: TargetConfig,
}

/// How a finished run is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPolicyKind {
    /// The result text must match `result_success_regex`.
    #[default]
    Pattern,
    /// Exit code 0 passes.
    ExitCode,
}

/// Settings of one target type.
///
/// Empty argument patterns fall back to the target type's built-in pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Test executable. Exposed to patterns as `${executable}`.
    pub executable: String,

    pub build_directory: String,

    pub src_directory: String,

    /// Command that runs one test.
    pub test_run_arg_pattern: String,

    /// Command that lists all tests as `<name>,<file>,<line>` lines.
    pub list_test_arg_pattern: String,

    /// File the test binary writes its result to.
    pub result_file: String,

    pub result_success_regex: String,

    /// Read run results from `result_file` instead of captured output.
    pub test_run_use_file: bool,

    /// Read the test list from `result_file` instead of captured output.
    pub list_test_use_file: bool,

    /// Directories prepended to the dynamic library search path.
    pub lib_paths: Vec<String>,

    /// Launch profile used when debugging; empty for the default profile.
    pub debug_config_name: String,

    pub pass_policy: PassPolicyKind,

    /// Fixture separators, tried in order.
    pub fixture_separators: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            executable: String::new(),
            build_directory: String::new(),
            src_directory: String::new(),
            test_run_arg_pattern: String::new(),
            list_test_arg_pattern: String::new(),
            result_file: DEFAULT_RESULT_FILE.to_string(),
            result_success_regex: DEFAULT_RESULT_SUCCESS_REGEX.to_string(),
            test_run_use_file: true,
            list_test_use_file: false,
            lib_paths: Vec::new(),
            debug_config_name: String::new(),
            pass_policy: PassPolicyKind::Pattern,
            fixture_separators: DEFAULT_FIXTURE_SEPARATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
