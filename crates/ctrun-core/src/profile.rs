//! Resolved, immutable per-target profiles.
//!
//! A [`Profile`] is built once from the [`Config`] for one [`TargetKind`]. It
//! validates the target's settings, resolves every directory through the
//! [`TemplateResolver`], and afterwards answers the questions the rest of the
//! system asks: how to list tests, how to run one, and how to judge it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{
    Config, ConfigError, PassPolicyKind, TargetConfig, DEFAULT_LIST_TEST_ARG_PATTERN,
    DEFAULT_PRIMARY_LIST_TEST_ARG_PATTERN, DEFAULT_PRIMARY_TEST_RUN_ARG_PATTERN,
    DEFAULT_TEST_RUN_ARG_PATTERN,
};
use crate::ctest::{CTestParser, ParseResult};
use crate::exec::{PassPolicy, ResultMode, RunRequest};
use crate::inventory::InventoryTest;
use crate::platform::TargetOs;
use crate::template::{has_unresolved, Bindings, Placeholder, TemplateResolver};

/// The kinds of test target a workspace can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Doc-tests driven through the Python runner.
    Primary,
    /// A test executable built by the project.
    Executable,
    /// A prebuilt test binary.
    Binary,
    /// Tests registered with CTest; the build system owns the executables.
    Cmake,
}

impl TargetKind {
    pub const ALL: [TargetKind; 4] = [
        TargetKind::Primary,
        TargetKind::Executable,
        TargetKind::Binary,
        TargetKind::Cmake,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Primary => "primary",
            TargetKind::Executable => "executable",
            TargetKind::Binary => "binary",
            TargetKind::Cmake => "cmake",
        }
    }

    /// The build system owns this target's executables and build tree.
    pub fn is_build_system_managed(self) -> bool {
        matches!(self, TargetKind::Cmake)
    }

    /// Whether tests of this target can be run under a debugger.
    pub fn supports_debug(self) -> bool {
        !matches!(self, TargetKind::Primary)
    }

    fn default_run_pattern(self) -> &'static str {
        match self {
            TargetKind::Primary => DEFAULT_PRIMARY_TEST_RUN_ARG_PATTERN,
            _ => DEFAULT_TEST_RUN_ARG_PATTERN,
        }
    }

    fn default_list_pattern(self) -> &'static str {
        match self {
            TargetKind::Primary => DEFAULT_PRIMARY_LIST_TEST_ARG_PATTERN,
            _ => DEFAULT_LIST_TEST_ARG_PATTERN,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown target type '{s}'")))
    }
}

/// The build tree of the build-system-managed target.
///
/// Owned by exactly one [`Profile`]; not cloneable.
#[derive(Debug)]
pub struct BuildSession {
    build_directory: PathBuf,
    build_type: Option<String>,
    use_ctest_discovery: bool,
    use_exit_code: bool,
}

impl BuildSession {
    pub fn build_directory(&self) -> &Path {
        &self.build_directory
    }

    pub fn build_type(&self) -> Option<&str> {
        self.build_type.as_deref()
    }

    pub fn uses_ctest_discovery(&self) -> bool {
        self.use_ctest_discovery
    }

    /// Reads the CTest registration files of the build tree.
    pub fn parse_tests(&self) -> ParseResult {
        CTestParser::new().parse(&self.build_directory, self.build_type.as_deref())
    }
}

/// A command to run together with how to judge its result.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub request: RunRequest,
    pub policy: PassPolicy,
}

/// Resolved settings of one target type.
#[derive(Debug)]
pub struct Profile {
    kind: TargetKind,
    resolver: TemplateResolver,
    build_directory: PathBuf,
    src_directory: Option<PathBuf>,
    executable: Option<String>,
    test_run_arg_pattern: String,
    list_test_arg_pattern: String,
    result_file: PathBuf,
    policy: PassPolicy,
    test_run_use_file: bool,
    list_test_use_file: bool,
    lib_paths: Vec<String>,
    debug_config_name: Option<String>,
    fixture_separators: Vec<String>,
    session: Option<BuildSession>,
}

impl Profile {
    /// Builds the profile of `kind` for the host OS.
    pub fn from_config(kind: TargetKind, config: &Config) -> Result<Self, ConfigError> {
        Self::from_config_for(kind, config, TargetOs::host())
    }

    /// Builds the profile of `kind`, resolving paths for `os`.
    pub fn from_config_for(
        kind: TargetKind,
        config: &Config,
        os: TargetOs,
    ) -> Result<Self, ConfigError> {
        let target = config.target(kind);
        validate(kind, config, target)?;

        let mut resolver = TemplateResolver::new(os)
            .with_value(Placeholder::WorkspaceFolder, workspace_root(config)?)
            .with_value(Placeholder::PythonExePath, config.workspace.python_exe_path.as_str())
            .with_value(Placeholder::CmakeTarget, config.cmake.target.as_str())
            .with_value(Placeholder::SrcDirectory, target.src_directory.as_str());
        let build_template = if kind.is_build_system_managed() {
            config.cmake.build_directory.as_str()
        } else {
            target.build_directory.as_str()
        };
        resolver.set(Placeholder::BuildDirectory, build_template);

        let build_directory = resolved_dir(kind, &resolver, Placeholder::BuildDirectory)?
            .ok_or_else(|| ConfigError::target(kind, "build_directory is not set"))?;
        let src_directory = resolved_dir(kind, &resolver, Placeholder::SrcDirectory)?;

        let executable = if target.executable.is_empty() {
            None
        } else {
            Some(resolver.resolve(&target.executable, &Bindings::new()))
        };

        let policy = match target.pass_policy {
            PassPolicyKind::ExitCode => PassPolicy::ExitCode,
            PassPolicyKind::Pattern => {
                let pattern = resolver.expand(&target.result_success_regex, &Bindings::new());
                let re = Regex::new(&pattern).map_err(|e| {
                    ConfigError::target(kind, format!("invalid result_success_regex: {e}"))
                })?;
                PassPolicy::SuccessPattern(re)
            }
        };

        let session = kind.is_build_system_managed().then(|| BuildSession {
            build_directory: build_directory.clone(),
            build_type: non_empty(&config.cmake.build_type),
            use_ctest_discovery: config.cmake.use_ctest_discovery,
            use_exit_code: config.cmake.use_exit_code,
        });

        Ok(Self {
            kind,
            build_directory,
            src_directory,
            executable,
            test_run_arg_pattern: or_default(&target.test_run_arg_pattern, kind.default_run_pattern()),
            list_test_arg_pattern: or_default(&target.list_test_arg_pattern, kind.default_list_pattern()),
            result_file: PathBuf::from(resolver.resolve(&target.result_file, &Bindings::new())),
            policy,
            test_run_use_file: target.test_run_use_file,
            list_test_use_file: target.list_test_use_file,
            lib_paths: target
                .lib_paths
                .iter()
                .map(|p| resolver.resolve(p, &Bindings::new()))
                .collect(),
            debug_config_name: non_empty(&target.debug_config_name),
            fixture_separators: target.fixture_separators.clone(),
            session,
            resolver,
        })
    }

    /// Profiles for every target type whose settings validate.
    ///
    /// Invalid targets are returned as errors next to the valid profiles.
    pub fn all_from_config(config: &Config) -> (Vec<Profile>, Vec<ConfigError>) {
        let mut profiles = Vec::new();
        let mut errors = Vec::new();
        for kind in TargetKind::ALL {
            match Self::from_config(kind, config) {
                Ok(profile) => profiles.push(profile),
                Err(e) => errors.push(e),
            }
        }
        (profiles, errors)
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    pub fn build_directory(&self) -> &Path {
        &self.build_directory
    }

    pub fn src_directory(&self) -> Option<&Path> {
        self.src_directory.as_deref()
    }

    pub fn executable(&self) -> Option<&str> {
        self.executable.as_deref()
    }

    pub fn lib_paths(&self) -> &[String] {
        &self.lib_paths
    }

    pub fn fixture_separators(&self) -> &[String] {
        &self.fixture_separators
    }

    pub fn session(&self) -> Option<&BuildSession> {
        self.session.as_ref()
    }

    /// The pass policy configured for pattern-based runs.
    pub fn policy(&self) -> &PassPolicy {
        &self.policy
    }

    /// True when tests come from CTest registration files.
    pub fn uses_ctest_discovery(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(BuildSession::uses_ctest_discovery)
    }

    fn base_bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        if let Some(executable) = &self.executable {
            bindings.insert("executable".to_string(), executable.clone());
        }
        bindings
    }

    fn result_mode(&self, use_file: bool) -> ResultMode {
        if use_file {
            ResultMode::ResultFile(self.result_file.clone())
        } else {
            ResultMode::CapturedOutput
        }
    }

    fn request(&self, command: Vec<String>, cwd: PathBuf, mode: ResultMode) -> RunRequest {
        let mut request = RunRequest::new(command, cwd)
            .with_result_mode(mode)
            .with_library_paths(self.lib_paths.clone());
        request.build_system_managed = self.kind.is_build_system_managed();
        request
    }

    /// Command that lists the target's tests.
    ///
    /// Fails when the program is still a placeholder, e.g. `${executable}`
    /// on a build-system-managed target that has no executable of its own.
    pub fn list_request(&self) -> Result<RunRequest, ConfigError> {
        let command = self
            .resolver
            .resolve_command(&self.list_test_arg_pattern, &self.base_bindings());
        if let Some(program) = command.first().filter(|p| has_unresolved(p)) {
            return Err(ConfigError::target(
                self.kind,
                format!(
                    "list command program `{program}` has unresolved placeholders; \
                     set list_test_arg_pattern to a concrete command"
                ),
            ));
        }
        Ok(self.request(
            command,
            self.build_directory.clone(),
            self.result_mode(self.list_test_use_file),
        ))
    }

    /// Plans the run of one test.
    ///
    /// CTest-discovered tests run their registered command in their
    /// registered working directory. Other tests run the resolved run pattern
    /// in the build directory.
    pub fn plan_run(&self, test: &InventoryTest, debug: bool) -> RunPlan {
        let mut plan = match (&test.definition, &self.session) {
            (Some(definition), Some(session)) if session.use_ctest_discovery => {
                let cwd = definition
                    .working_directory
                    .as_deref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.build_directory.clone());
                let (policy, mode) = if session.use_exit_code {
                    (PassPolicy::ExitCode, ResultMode::CapturedOutput)
                } else {
                    (self.policy.clone(), self.result_mode(self.test_run_use_file))
                };
                RunPlan {
                    request: self.request(definition.command_line(), cwd, mode),
                    policy,
                }
            }
            _ => {
                let mut bindings = self.base_bindings();
                bindings.insert("test_full_name".to_string(), test.id.clone());
                bindings.insert("test_suite_name".to_string(), test.fixture.clone());
                bindings.insert("test_case_name".to_string(), test.label.clone());
                let command = self
                    .resolver
                    .resolve_command(&self.test_run_arg_pattern, &bindings);
                RunPlan {
                    request: self.request(
                        command,
                        self.build_directory.clone(),
                        self.result_mode(self.test_run_use_file),
                    ),
                    policy: self.policy.clone(),
                }
            }
        };

        if debug && self.kind.supports_debug() {
            plan.request = plan.request.with_debug(self.debug_config_name.clone());
        }
        plan
    }
}

fn validate(kind: TargetKind, config: &Config, target: &TargetConfig) -> Result<(), ConfigError> {
    if kind == TargetKind::Primary && config.workspace.python_exe_path.is_empty() {
        return Err(ConfigError::target(kind, "python_exe_path must be set"));
    }

    if kind.is_build_system_managed() {
        if config.cmake.build_directory.is_empty() {
            return Err(ConfigError::target(kind, "[cmake] build_directory must be set"));
        }
        if !target.build_directory.is_empty() || !target.executable.is_empty() {
            return Err(ConfigError::target(
                kind,
                "executable and build_directory must be empty; the build system provides them",
            ));
        }
    } else {
        if target.build_directory.is_empty() || target.src_directory.is_empty() {
            return Err(ConfigError::target(
                kind,
                "build_directory and src_directory must be set",
            ));
        }
        if kind != TargetKind::Primary && target.executable.is_empty() {
            return Err(ConfigError::target(kind, "executable must be set"));
        }
    }

    if target.test_run_use_file || target.list_test_use_file {
        if target.result_file.is_empty() {
            return Err(ConfigError::target(kind, "result_file must be set"));
        }
    }
    Ok(())
}

fn workspace_root(config: &Config) -> Result<String, ConfigError> {
    if !config.workspace.root.is_empty() {
        return Ok(config.workspace.root.clone());
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.to_string_lossy().into_owned())
}

fn resolved_dir(
    kind: TargetKind,
    resolver: &TemplateResolver,
    placeholder: Placeholder,
) -> Result<Option<PathBuf>, ConfigError> {
    match resolver.value(placeholder) {
        Some(value) if has_unresolved(&value) => Err(ConfigError::target(
            kind,
            format!("{placeholder} has unresolved placeholders: {value}"),
        )),
        Some(value) => Ok(Some(PathBuf::from(value))),
        None => Ok(None),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctest::TestDefinition;

    fn exe_config() -> Config {
        let mut config = Config::default();
        config.workspace.root = "/ws".to_string();
        let exe = &mut config.targets.executable;
        exe.build_directory = "${workspaceFolder}/build".to_string();
        exe.src_directory = "${workspaceFolder}/src".to_string();
        exe.executable = "${buildDirectory}/unit_tests".to_string();
        exe.test_run_arg_pattern = "${executable} --run ${test_full_name}".to_string();
        exe.lib_paths = vec!["${buildDirectory}/lib".to_string()];
        config
    }

    fn test(id: &str, fixture: &str, label: &str) -> InventoryTest {
        InventoryTest {
            id: id.to_string(),
            fixture: fixture.to_string(),
            label: label.to_string(),
            source_file: None,
            line: None,
            definition: None,
        }
    }

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("cmake".parse::<TargetKind>().unwrap(), TargetKind::Cmake);
        assert_eq!(" Binary ".parse::<TargetKind>().unwrap(), TargetKind::Binary);
        assert!("nope".parse::<TargetKind>().is_err());
    }

    #[test]
    fn test_executable_profile_resolves() {
        let profile =
            Profile::from_config_for(TargetKind::Executable, &exe_config(), TargetOs::Linux)
                .unwrap();
        assert_eq!(profile.build_directory(), Path::new("/ws/build"));
        assert_eq!(profile.src_directory(), Some(Path::new("/ws/src")));
        assert_eq!(profile.executable(), Some("/ws/build/unit_tests"));
        assert_eq!(profile.lib_paths(), ["/ws/build/lib"]);
        assert!(profile.session().is_none());
    }

    #[test]
    fn test_plan_run_binds_names() {
        let profile =
            Profile::from_config_for(TargetKind::Executable, &exe_config(), TargetOs::Linux)
                .unwrap();
        let plan = profile.plan_run(&test("Math::Adds", "Math", "Adds"), false);
        assert_eq!(
            plan.request.command,
            vec!["/ws/build/unit_tests", "--run", "Math::Adds"]
        );
        assert_eq!(plan.request.working_directory, PathBuf::from("/ws/build"));
        assert!(!plan.request.debug);
        assert!(matches!(plan.request.result_mode, ResultMode::ResultFile(_)));
    }

    #[test]
    fn test_plan_run_debug_uses_config_name() {
        let mut config = exe_config();
        config.targets.executable.debug_config_name = "gdb tests".to_string();
        let profile =
            Profile::from_config_for(TargetKind::Executable, &config, TargetOs::Linux).unwrap();
        let plan = profile.plan_run(&test("A::b", "A", "b"), true);
        assert!(plan.request.debug);
        assert_eq!(plan.request.launch_name.as_deref(), Some("gdb tests"));
    }

    #[test]
    fn test_missing_executable_is_rejected() {
        let mut config = exe_config();
        config.targets.executable.executable.clear();
        let err = Profile::from_config(TargetKind::Executable, &config).unwrap_err();
        assert!(err.to_string().contains("executable must be set"));
    }

    #[test]
    fn test_primary_requires_python() {
        let mut config = exe_config();
        config.targets.primary = config.targets.executable.clone();
        let err = Profile::from_config(TargetKind::Primary, &config).unwrap_err();
        assert!(err.to_string().contains("python_exe_path"));
    }

    #[test]
    fn test_managed_forbids_per_target_paths() {
        let mut config = exe_config();
        config.targets.cmake.executable = "x".to_string();
        assert!(Profile::from_config(TargetKind::Cmake, &config).is_err());

        config.targets.cmake.executable.clear();
        let profile =
            Profile::from_config_for(TargetKind::Cmake, &config, TargetOs::Linux).unwrap();
        assert_eq!(profile.build_directory(), Path::new("/ws/build"));
        assert!(profile.uses_ctest_discovery());
        assert_eq!(
            profile.session().unwrap().build_directory(),
            Path::new("/ws/build")
        );
    }

    #[test]
    fn test_ctest_definition_runs_with_exit_code() {
        let mut config = exe_config();
        config.cmake.build_directory = "/b".to_string();
        let profile =
            Profile::from_config_for(TargetKind::Cmake, &config, TargetOs::Linux).unwrap();

        let mut definition = TestDefinition::new(
            "Math.Adds",
            "/b/math_tests",
            vec!["--gtest_filter=Math.Adds".to_string()],
        );
        definition.working_directory = Some("/b/tests".to_string());
        let mut t = test("Math.Adds", "Math", "Adds");
        t.definition = Some(definition);

        let plan = profile.plan_run(&t, false);
        assert!(matches!(plan.policy, PassPolicy::ExitCode));
        assert_eq!(
            plan.request.command,
            vec!["/b/math_tests", "--gtest_filter=Math.Adds"]
        );
        assert_eq!(plan.request.working_directory, PathBuf::from("/b/tests"));
        assert_eq!(plan.request.result_mode, ResultMode::CapturedOutput);
        assert!(plan.request.build_system_managed);
    }

    #[test]
    fn test_plan_run_keeps_test_name_separators_on_windows() {
        let mut config = exe_config();
        config.workspace.root = "C:/ws".to_string();
        config.targets.executable.executable = "${buildDirectory}/t.exe".to_string();
        config.targets.executable.test_run_arg_pattern =
            "${executable} --gtest_filter=${test_full_name}".to_string();
        let profile =
            Profile::from_config_for(TargetKind::Executable, &config, TargetOs::Windows).unwrap();

        let plan = profile.plan_run(&test("Inst/Suite.Case/0", "Inst/Suite", "Case/0"), false);
        assert_eq!(
            plan.request.command,
            vec!["C:\\ws\\build\\t.exe", "--gtest_filter=Inst/Suite.Case/0"]
        );
    }

    #[test]
    fn test_list_request_rejects_unresolved_program() {
        let mut config = exe_config();
        config.cmake.build_directory = "/b".to_string();
        let profile =
            Profile::from_config_for(TargetKind::Cmake, &config, TargetOs::Linux).unwrap();
        let err = profile.list_request().unwrap_err();
        assert!(err.to_string().contains("${executable}"), "{err}");

        config.targets.cmake.list_test_arg_pattern = "/b/lister --list".to_string();
        let profile =
            Profile::from_config_for(TargetKind::Cmake, &config, TargetOs::Linux).unwrap();
        assert_eq!(profile.list_request().unwrap().command, vec!["/b/lister", "--list"]);
    }

    #[test]
    fn test_invalid_success_regex() {
        let mut config = exe_config();
        config.targets.executable.result_success_regex = "(".to_string();
        let err = Profile::from_config(TargetKind::Executable, &config).unwrap_err();
        assert!(err.to_string().contains("result_success_regex"));
    }
}
