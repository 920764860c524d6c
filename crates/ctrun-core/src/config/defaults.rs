//! Default values for ctrun configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// File Locations
// ============================================================================

/// Project-local config file name.
pub const PROJECT_CONFIG_FILE: &str = "ctrun.toml";

/// Directory under the user config dir holding `config.toml`.
pub const USER_CONFIG_DIR: &str = "ctrun";

/// User config file name.
pub const USER_CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default `tracing` filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "ctrun=info,ctrun_core=info";

// ============================================================================
// Target Defaults
// ============================================================================

/// Default command used to run a single test of an executable target.
pub const DEFAULT_TEST_RUN_ARG_PATTERN: &str =
    "${executable} --cdt_run_testcase=${test_full_name} --cdt_output_xml=output.vsc";

/// Default command used to list the tests of an executable target.
pub const DEFAULT_LIST_TEST_ARG_PATTERN: &str = "${executable} --cdt_list_testcase";

/// Default command used to run a single test of the primary target.
pub const DEFAULT_PRIMARY_TEST_RUN_ARG_PATTERN: &str = "${pythonExePath} -m cdoctest \
     --cdt_cmake_build_path=${buildDirectory} --cdt_cmake_target=${cmakeTarget} \
     --cdt_run_testcase=${test_full_name} --cdt_output_xml=output.vsc";

/// Default command used to list the tests of the primary target.
pub const DEFAULT_PRIMARY_LIST_TEST_ARG_PATTERN: &str = "${pythonExePath} -m cdoctest \
     --cdt_cmake_build_path=${buildDirectory} --cdt_cmake_target=${cmakeTarget} \
     --cdt_list_testcase";

/// Default result file written by the test binary.
pub const DEFAULT_RESULT_FILE: &str = "${buildDirectory}/output.vsc";

/// Default regex a result must match to count as passed.
pub const DEFAULT_RESULT_SUCCESS_REGEX: &str = r#"failedtests="0""#;

/// Separators tried, in order, when splitting a test name into fixture and case.
pub const DEFAULT_FIXTURE_SEPARATORS: &[&str] = &["::", "."];

/// Default build directory of the build-system-managed target.
pub const DEFAULT_CMAKE_BUILD_DIRECTORY: &str = "${workspaceFolder}/build";

// ============================================================================
// Debugger Defaults
// ============================================================================

/// Launch profile name used when none is configured.
pub const DEFAULT_LAUNCH_NAME: &str = "Debug Program";

/// Launch request kind.
pub const DEFAULT_LAUNCH_REQUEST: &str = "launch";
