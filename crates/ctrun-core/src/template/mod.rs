//! Placeholder expansion for configuration strings.
//!
//! Argument patterns, result-file paths and directories in the configuration
//! may reference each other through `${name}` placeholders:
//!
//! ```toml
//! build_directory = "${workspaceFolder}/build"
//! test_run_arg_pattern = "${buildDirectory}/unit_tests --run ${test_full_name}"
//! ```
//!
//! Expansion happens in two steps. Per-invocation bindings (such as the test
//! case name) are substituted literally first, then the well-known
//! [`Placeholder`] values are substituted repeatedly, since a placeholder's
//! value may itself contain further placeholders.

use std::collections::BTreeMap;
use std::fmt;

use crate::ctest::parse_command_line;
use crate::platform::TargetOs;

/// Marker that opens a placeholder.
pub const MARKER: &str = "${";

/// Upper bound on substitution passes. Enough for every nesting depth seen
/// in practice (a directory defined via another directory via the workspace).
pub const MAX_PASSES: usize = 4;

/// Per-invocation values substituted before the well-known placeholders.
pub type Bindings = BTreeMap<String, String>;

/// Placeholders whose values come from the resolved profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    BuildDirectory,
    SrcDirectory,
    WorkspaceFolder,
    CmakeTarget,
    PythonExePath,
}

impl Placeholder {
    pub const ALL: [Placeholder; 5] = [
        Placeholder::BuildDirectory,
        Placeholder::SrcDirectory,
        Placeholder::WorkspaceFolder,
        Placeholder::CmakeTarget,
        Placeholder::PythonExePath,
    ];

    /// Name as written between `${` and `}`.
    pub fn name(self) -> &'static str {
        match self {
            Placeholder::BuildDirectory => "buildDirectory",
            Placeholder::SrcDirectory => "srcDirectory",
            Placeholder::WorkspaceFolder => "workspaceFolder",
            Placeholder::CmakeTarget => "cmakeTarget",
            Placeholder::PythonExePath => "pythonExePath",
        }
    }

    pub fn token(self) -> String {
        token(self.name())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

fn token(name: &str) -> String {
    format!("${{{name}}}")
}

/// Returns true if `text` still contains a placeholder marker.
pub fn has_unresolved(text: &str) -> bool {
    text.contains(MARKER)
}

/// Expands placeholders against a fixed set of profile values.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    values: BTreeMap<Placeholder, String>,
    os: TargetOs,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new(TargetOs::host())
    }
}

impl TemplateResolver {
    /// Creates a resolver with no placeholder values for the given OS.
    pub fn new(os: TargetOs) -> Self {
        Self {
            values: BTreeMap::new(),
            os,
        }
    }

    /// Sets a placeholder value (builder style).
    pub fn with_value(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.set(placeholder, value);
        self
    }

    /// Sets a placeholder value. Empty values are treated as unset.
    pub fn set(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&placeholder);
        } else {
            self.values.insert(placeholder, value);
        }
    }

    /// Raw, unexpanded value of a placeholder.
    pub fn raw_value(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }

    /// Fully expanded value of a placeholder, normalized as a path.
    ///
    /// The placeholder itself is excluded while expanding its own value, so a
    /// self-referencing definition stays inert instead of recursing.
    pub fn value(&self, placeholder: Placeholder) -> Option<String> {
        let raw = self.values.get(&placeholder)?;
        let mut skip = vec![placeholder];
        let expanded = self.expand_known(raw.clone(), &mut skip);
        Some(self.os.normalize_separators(&expanded))
    }

    pub fn os(&self) -> TargetOs {
        self.os
    }

    /// Expands `text` and normalizes path separators for the target OS.
    pub fn resolve(&self, text: &str, bindings: &Bindings) -> String {
        let expanded = self.expand(text, bindings);
        self.os.normalize_separators(&expanded)
    }

    /// Expands `text` without touching path separators.
    pub fn expand(&self, text: &str, bindings: &Bindings) -> String {
        let mut out = text.to_string();
        for (key, value) in bindings {
            out = out.replace(&token(key), value);
        }
        let mut skip = Vec::new();
        self.expand_known(out, &mut skip)
    }

    /// Splits an argument pattern into tokens and expands each of them.
    ///
    /// Tokenizing first keeps a bound value containing spaces inside a
    /// single argument. Only the program is normalized as a path; arguments
    /// keep their separators, so test names such as `Inst/Suite.Case/0`
    /// reach the test binary unchanged.
    pub fn resolve_command(&self, pattern: &str, bindings: &Bindings) -> Vec<String> {
        parse_command_line(pattern)
            .iter()
            .enumerate()
            .map(|(index, part)| {
                if index == 0 {
                    self.resolve(part, bindings)
                } else {
                    self.expand(part, bindings)
                }
            })
            .collect()
    }

    fn expand_known(&self, mut text: String, skip: &mut Vec<Placeholder>) -> String {
        for _ in 0..MAX_PASSES {
            if !has_unresolved(&text) {
                break;
            }
            let before = text.clone();
            for placeholder in Placeholder::ALL {
                if skip.contains(&placeholder) {
                    continue;
                }
                let token = placeholder.token();
                if !text.contains(&token) {
                    continue;
                }
                let Some(raw) = self.values.get(&placeholder) else {
                    continue;
                };
                skip.push(placeholder);
                let value = self.expand_known(raw.clone(), skip);
                skip.pop();
                text = text.replace(&token, &value);
            }
            if text == before {
                break;
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TemplateResolver {
        TemplateResolver::new(TargetOs::Linux)
            .with_value(Placeholder::WorkspaceFolder, "/ws")
            .with_value(Placeholder::BuildDirectory, "${workspaceFolder}/build")
            .with_value(Placeholder::SrcDirectory, "${workspaceFolder}/src")
    }

    #[test]
    fn test_bindings_before_placeholders() {
        let mut bindings = Bindings::new();
        bindings.insert("test_case_name".to_string(), "Adds".to_string());
        let out = resolver().resolve("${buildDirectory}/t --case=${test_case_name}", &bindings);
        assert_eq!(out, "/ws/build/t --case=Adds");
    }

    #[test]
    fn test_unknown_placeholder_is_inert() {
        let out = resolver().resolve("${unknownVar}", &Bindings::new());
        assert_eq!(out, "${unknownVar}");
        assert!(has_unresolved(&out));
    }

    #[test]
    fn test_self_reference_terminates() {
        let r = TemplateResolver::new(TargetOs::Linux)
            .with_value(Placeholder::BuildDirectory, "${buildDirectory}/out");
        assert_eq!(
            r.value(Placeholder::BuildDirectory).as_deref(),
            Some("${buildDirectory}/out")
        );
        let out = r.resolve("${buildDirectory}", &Bindings::new());
        assert!(has_unresolved(&out));
    }

    #[test]
    fn test_windows_normalization() {
        let r = TemplateResolver::new(TargetOs::Windows)
            .with_value(Placeholder::BuildDirectory, "C:/proj/build");
        assert_eq!(
            r.resolve("${buildDirectory}/bin/t.exe", &Bindings::new()),
            "C:\\proj\\build\\bin\\t.exe"
        );
    }

    #[test]
    fn test_resolve_command_keeps_bound_spaces() {
        let mut bindings = Bindings::new();
        bindings.insert("test_full_name".to_string(), "Suite::has space".to_string());
        let argv = resolver().resolve_command(
            "${buildDirectory}/runner --filter \"${test_full_name}\"",
            &bindings,
        );
        assert_eq!(argv, vec!["/ws/build/runner", "--filter", "Suite::has space"]);
    }

    #[test]
    fn test_resolve_command_normalizes_only_program() {
        let r = TemplateResolver::new(TargetOs::Windows)
            .with_value(Placeholder::BuildDirectory, "C:/ws/build");
        let mut bindings = Bindings::new();
        bindings.insert("test_full_name".to_string(), "Inst/Suite.Case/0".to_string());
        let argv = r.resolve_command("${buildDirectory}/t.exe --gtest_filter=${test_full_name}", &bindings);
        assert_eq!(argv, vec!["C:\\ws\\build\\t.exe", "--gtest_filter=Inst/Suite.Case/0"]);

        let mut bindings = Bindings::new();
        bindings.insert("test_full_name".to_string(), r"Esc\Name".to_string());
        let argv = resolver().resolve_command("${buildDirectory}/t \"--gtest_filter=${test_full_name}\"", &bindings);
        assert_eq!(argv, vec!["/ws/build/t", r"--gtest_filter=Esc\Name"]);
    }

    #[test]
    fn test_empty_value_is_unset() {
        let mut r = resolver();
        r.set(Placeholder::CmakeTarget, "");
        assert!(r.raw_value(Placeholder::CmakeTarget).is_none());
        assert_eq!(r.expand("${cmakeTarget}", &Bindings::new()), "${cmakeTarget}");
    }
}
