use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::conditions::Branches;
use super::error::DiscoveryError;
use super::model::{ParseResult, TestDefinition};
use super::tokenizer::{block_end, parse_command_line};

/// File CMake writes into each build directory that registers tests.
pub const ROOT_TEST_FILE: &str = "CTestTestfile.cmake";

/// Executable CMake registers for a test missing from the active configuration.
const NOT_AVAILABLE: &str = "NOT_AVAILABLE";

/// Suffix of the test `gtest_discover_tests` registers before the target is built.
const NOT_BUILT_SUFFIX: &str = "_NOT_BUILT";

/// Configuration subdirectories probed for multi-configuration generators.
pub const CONFIGURATION_DIRS: &[&str] = &["Debug", "Release", "RelWithDebInfo", "MinSizeRel"];

static ADD_TEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^add_test\s*\((.+)\)\s*$").expect("add_test pattern"));

static SET_PROPERTIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^set_tests_properties\s*\((.*?)\bPROPERTIES\b(.*)$")
        .expect("set_tests_properties pattern")
});

static INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^include\s*\((.*)\)\s*$").expect("include pattern"));

static SUBDIRS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:subdirs|add_subdirectory)\s*\((.*)\)\s*$").expect("subdirs pattern")
});

/// Test properties the parser understands. Everything else is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Property {
    WorkingDirectory,
    TestFile,
    TestLine,
    TestFullName,
    TestFramework,
    Depends,
    Labels,
}

impl Property {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "WORKING_DIRECTORY" => Some(Property::WorkingDirectory),
            "TEST_FILE" => Some(Property::TestFile),
            "TEST_LINE" => Some(Property::TestLine),
            "TEST_FULL_NAME" => Some(Property::TestFullName),
            "TEST_FRAMEWORK" => Some(Property::TestFramework),
            "DEPENDS" => Some(Property::Depends),
            "LABELS" => Some(Property::Labels),
            _ => None,
        }
    }
}

/// Which directive referenced a path. Subdirectory references always name a
/// directory; includes name a file unless the path is a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Include,
    Subdirs,
}

#[derive(Debug, Default)]
struct Discovery {
    visited: HashSet<PathBuf>,
    files: Vec<(PathBuf, String)>,
    errors: Vec<DiscoveryError>,
}

#[derive(Debug, Default)]
struct FileScan {
    tests: Vec<TestDefinition>,
    problems: Vec<DiscoveryError>,
}

/// Reads CTest registration files below a build directory.
#[derive(Debug, Clone)]
pub struct CTestParser {
    root_file: String,
    configuration_dirs: Vec<String>,
}

impl Default for CTestParser {
    fn default() -> Self {
        Self {
            root_file: ROOT_TEST_FILE.to_string(),
            configuration_dirs: CONFIGURATION_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CTestParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every registration file reachable from `build_directory`.
    ///
    /// Missing, unreadable or malformed files end up in
    /// [`ParseResult::errors`]; the remaining files are still parsed.
    pub fn parse(&self, build_directory: &Path, build_type: Option<&str>) -> ParseResult {
        let mut result = ParseResult::default();

        let roots = self.find_root_files(build_directory, build_type);
        if roots.is_empty() {
            let err = DiscoveryError::NoTestFiles(build_directory.to_path_buf());
            warn!("{err}");
            result.errors.push(err.to_string());
            return result;
        }

        let mut discovery = Discovery::default();
        for root in &roots {
            self.visit(root, build_type, &mut discovery);
        }

        for (path, content) in &discovery.files {
            let scan = self.scan(path, content, build_type);
            debug!(file = %path.display(), tests = scan.tests.len(), "parsed CTest file");
            result.tests.extend(scan.tests);
            result
                .errors
                .extend(scan.problems.iter().map(|e| e.to_string()));
        }
        for err in &discovery.errors {
            warn!("{err}");
        }
        result
            .errors
            .extend(discovery.errors.iter().map(|e| e.to_string()));

        result
    }

    /// Root registration files for a build directory.
    ///
    /// The top-level file comes first. When `build_type` names an existing
    /// configuration subdirectory only that one is added; otherwise every
    /// conventional configuration subdirectory is probed.
    pub fn find_root_files(&self, build_directory: &Path, build_type: Option<&str>) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let base = build_directory.join(&self.root_file);
        if base.is_file() {
            files.push(base);
        }

        if let Some(build_type) = build_type.filter(|b| !b.is_empty()) {
            let config_file = build_directory.join(build_type).join(&self.root_file);
            if config_file.is_file() {
                files.push(config_file);
                return files;
            }
        }

        for config in &self.configuration_dirs {
            let config_file = build_directory.join(config).join(&self.root_file);
            if config_file.is_file() {
                files.push(config_file);
            }
        }

        files
    }

    /// Every file reachable from `path` through `include`/`subdirs`, each
    /// exactly once, in discovery order. Unreachable references are skipped.
    pub fn recursive_include(&self, path: &Path) -> Vec<PathBuf> {
        let mut discovery = Discovery::default();
        self.visit(path, None, &mut discovery);
        discovery.files.into_iter().map(|(path, _)| path).collect()
    }

    /// Parses the tests declared directly in one file.
    pub fn parse_ctest_file(&self, path: &Path) -> Result<Vec<TestDefinition>, DiscoveryError> {
        let content = fs::read_to_string(path).map_err(|e| DiscoveryError::io(path, e))?;
        let scan = self.scan(path, &content, None);
        for problem in &scan.problems {
            warn!("{problem}");
        }
        Ok(scan.tests)
    }

    fn visit(&self, path: &Path, build_type: Option<&str>, discovery: &mut Discovery) {
        let path = if path.is_dir() {
            path.join(&self.root_file)
        } else {
            path.to_path_buf()
        };
        let Ok(canonical) = fs::canonicalize(&path) else {
            discovery.errors.push(DiscoveryError::NotFound(path));
            return;
        };
        if !discovery.visited.insert(canonical.clone()) {
            return;
        }

        let content = match fs::read_to_string(&canonical) {
            Ok(content) => content,
            Err(e) => {
                discovery.errors.push(DiscoveryError::io(&canonical, e));
                return;
            }
        };

        let base = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let references = self.references(&content, Branches::new(&base, build_type));
        discovery.files.push((canonical, content));

        for (directive, reference) in references {
            let mut next = PathBuf::from(&reference);
            if next.is_relative() {
                next = base.join(next);
            }
            if directive == Directive::Subdirs && !next.is_file() {
                next = next.join(&self.root_file);
            }
            self.visit(&next, build_type, discovery);
        }
    }

    /// `include`/`subdirs` targets named in the live branches of a file, in order.
    fn references(&self, content: &str, branches: Branches<'_>) -> Vec<(Directive, String)> {
        let mut refs = Vec::new();
        for (_, line) in branches.active_lines(content) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(caps) = INCLUDE.captures(line) {
                if let Some(first) = parse_command_line(&caps[1]).into_iter().next() {
                    refs.push((Directive::Include, first));
                }
            } else if let Some(caps) = SUBDIRS.captures(line) {
                for dir in parse_command_line(&caps[1]) {
                    refs.push((Directive::Subdirs, dir));
                }
            }
        }
        refs
    }

    fn scan(&self, path: &Path, content: &str, build_type: Option<&str>) -> FileScan {
        let mut scan = FileScan::default();
        // Indices into `scan.tests` receiving the current property block.
        let mut bound: Vec<usize> = Vec::new();
        let mut in_properties = false;
        // Property key whose value continues on the next line.
        let mut pending: Option<String> = None;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for (line_no, line) in Branches::new(base, build_type).active_lines(content) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(caps) = ADD_TEST.captures(line) {
                if in_properties {
                    scan.problems.push(DiscoveryError::malformed(
                        path,
                        line_no,
                        "set_tests_properties block not closed before add_test",
                    ));
                    in_properties = false;
                    pending = None;
                    bound.clear();
                }
                let mut parts = parse_command_line(&caps[1]);
                if parts.len() < 2 {
                    scan.problems.push(DiscoveryError::malformed(
                        path,
                        line_no,
                        "add_test without a command",
                    ));
                    continue;
                }
                let name = parts.remove(0);
                let executable = parts.remove(0);
                if let Some(reason) = placeholder_reason(&name, &executable) {
                    debug!(file = %path.display(), line = line_no, %name, reason, "skipping placeholder test");
                    scan.problems.push(DiscoveryError::Unavailable {
                        path: path.to_path_buf(),
                        line: line_no,
                        name,
                        reason,
                    });
                    continue;
                }
                let mut test = TestDefinition::new(name, executable, parts);
                test.source = Some(path.to_path_buf());
                scan.tests.push(test);
                continue;
            }

            let properties = if in_properties {
                line
            } else if let Some(caps) = SET_PROPERTIES.captures(line) {
                let names = parse_command_line(caps.get(1).map_or("", |m| m.as_str()));
                bound = names
                    .iter()
                    .filter_map(|name| scan.tests.iter().rposition(|t| t.name == *name))
                    .collect();
                if bound.is_empty() {
                    debug!(file = %path.display(), line = line_no, "properties for unknown test");
                }
                in_properties = true;
                pending = None;
                caps.get(2).map_or("", |m| m.as_str())
            } else {
                continue;
            };

            let end = block_end(properties);
            let body = end.map_or(properties, |end| &properties[..end]);
            for (key, value) in property_pairs(body, &mut pending) {
                for &i in &bound {
                    if let Err(message) = apply_property(&mut scan.tests[i], &key, &value) {
                        scan
                            .problems
                            .push(DiscoveryError::malformed(path, line_no, message));
                    }
                }
            }

            if end.is_some() {
                in_properties = false;
                pending = None;
                bound.clear();
            }
        }

        scan
    }
}

/// Why a declaration is one of CMake's stand-ins rather than a real test.
fn placeholder_reason(name: &str, executable: &str) -> Option<&'static str> {
    if executable == NOT_AVAILABLE {
        Some("not available in the active build configuration")
    } else if executable == name && name.ends_with(NOT_BUILT_SUFFIX) {
        Some("the test executable has not been built")
    } else {
        None
    }
}

/// Splits property text into key/value pairs. A key whose value has not
/// appeared yet is carried in `pending` to the next line.
fn property_pairs(text: &str, pending: &mut Option<String>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for token in parse_command_line(text) {
        match pending.take() {
            Some(key) => pairs.push((key, token)),
            None => *pending = Some(token),
        }
    }
    pairs
}

/// Applies one property to `test`. Unrecognized keys are ignored.
fn apply_property(test: &mut TestDefinition, key: &str, value: &str) -> Result<(), String> {
    let Some(property) = Property::from_key(key) else {
        return Ok(());
    };
    match property {
        Property::WorkingDirectory => test.working_directory = Some(value.to_string()),
        Property::TestFile => test.test_file = Some(value.to_string()),
        Property::TestLine => {
            let line = value
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid TEST_LINE value `{value}`"))?;
            test.test_line = Some(line);
        }
        Property::TestFullName => test.test_full_name = Some(value.to_string()),
        Property::TestFramework => test.test_framework = Some(value.to_string()),
        Property::Depends => extend_list(&mut test.depends, value),
        Property::Labels => extend_list(&mut test.labels, value),
    }
    Ok(())
}

/// Appends every entry of a `;`-separated CMake list, skipping duplicates.
fn extend_list(list: &mut Vec<String>, value: &str) {
    for item in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        if !list.iter().any(|existing| existing == item) {
            list.push(item.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_str(content: &str) -> FileScan {
        CTestParser::new().scan(Path::new("CTestTestfile.cmake"), content, None)
    }

    #[test]
    fn test_property_binding() {
        let scan = scan_str(
            r#"add_test("T" "/e" "a")
set_tests_properties("T" PROPERTIES
  WORKING_DIRECTORY "/w"
  TEST_LINE "7"
)"#,
        );
        assert!(scan.problems.is_empty());
        assert_eq!(scan.tests.len(), 1);
        let t = &scan.tests[0];
        assert_eq!(t.name, "T");
        assert_eq!(t.executable, "/e");
        assert_eq!(t.args, vec!["a"]);
        assert_eq!(t.working_directory.as_deref(), Some("/w"));
        assert_eq!(t.test_line, Some(7));
        assert!(t.test_file.is_none());
    }

    #[test]
    fn test_single_line_bare_properties() {
        let scan = scan_str(
            "add_test( MathTests.Addition /b/hello_test [==[--gtest_filter=MathTests.Addition]==] --gtest_also_run_disabled_tests)\n\
             set_tests_properties( MathTests.Addition PROPERTIES WORKING_DIRECTORY /b SKIP_REGULAR_EXPRESSION [==[[  SKIPPED ]]==])\n\
             add_test( MathTests.FAIL /b/hello_test [==[--gtest_filter=MathTests.FAIL]==])\n",
        );
        assert_eq!(scan.tests.len(), 2);
        assert_eq!(scan.tests[0].working_directory.as_deref(), Some("/b"));
        assert_eq!(
            scan.tests[0].args,
            vec!["--gtest_filter=MathTests.Addition", "--gtest_also_run_disabled_tests"]
        );
        assert!(scan.tests[1].working_directory.is_none());
    }

    #[test]
    fn test_last_declaration_wins() {
        let scan = scan_str(
            "add_test(\"T\" \"/first\")\n\
             add_test(\"T\" \"/second\")\n\
             set_tests_properties(\"T\" PROPERTIES TEST_FRAMEWORK \"gtest\")\n",
        );
        assert!(scan.tests[0].test_framework.is_none());
        assert_eq!(scan.tests[1].test_framework.as_deref(), Some("gtest"));
    }

    #[test]
    fn test_all_dependencies_are_kept() {
        let scan = scan_str(
            "add_test(\"T\" \"/e\")\n\
             set_tests_properties(\"T\" PROPERTIES\n\
               DEPENDS \"setup;db::init\"\n\
               DEPENDS \"other\"\n\
               LABELS \"unit;fast\")\n",
        );
        assert_eq!(scan.tests[0].depends, vec!["setup", "db::init", "other"]);
        assert_eq!(scan.tests[0].labels, vec!["unit", "fast"]);
    }

    #[test]
    fn test_invalid_line_is_reported() {
        let scan = scan_str("add_test(\"T\" \"/e\")\nset_tests_properties(\"T\" PROPERTIES TEST_LINE \"x\")\n");
        assert_eq!(scan.tests.len(), 1);
        assert_eq!(scan.problems.len(), 1);
        assert!(scan.tests[0].test_line.is_none());
    }

    #[test]
    fn test_unclosed_block_does_not_swallow_tests() {
        let scan = scan_str(
            "add_test(\"A\" \"/e\")\n\
             set_tests_properties(\"A\" PROPERTIES\n\
               TEST_FILE \"/src/a.cpp\"\n\
             add_test(\"B\" \"/e\")\n",
        );
        assert_eq!(scan.tests.len(), 2);
        assert_eq!(scan.tests[0].test_file.as_deref(), Some("/src/a.cpp"));
        assert_eq!(scan.problems.len(), 1);
    }

    #[test]
    fn test_quoted_values_do_not_leak_keys() {
        let scan = scan_str(
            "add_test(\"T\" \"/e\")\n\
             set_tests_properties(\"T\" PROPERTIES TEST_FULL_NAME \"x DEPENDS y\" LABELS a LABELS b)\n",
        );
        let t = &scan.tests[0];
        assert_eq!(t.test_full_name.as_deref(), Some("x DEPENDS y"));
        assert!(t.depends.is_empty());
        assert_eq!(t.labels, vec!["a", "b"]);
    }

    #[test]
    fn test_value_on_next_line() {
        let scan = scan_str(
            "add_test(\"T\" \"/e\")\n\
             set_tests_properties(\"T\" PROPERTIES WORKING_DIRECTORY\n\
               \"/w\" TEST_LINE 3)\n",
        );
        assert!(scan.problems.is_empty(), "{:?}", scan.problems);
        assert_eq!(scan.tests[0].working_directory.as_deref(), Some("/w"));
        assert_eq!(scan.tests[0].test_line, Some(3));
    }

    #[test]
    fn test_placeholder_tests_are_reported_not_registered() {
        let scan = scan_str(
            "add_test(hello_test_NOT_BUILT hello_test_NOT_BUILT)\n\
             add_test([=[mytest]=] NOT_AVAILABLE)\n\
             add_test(real_NOT_BUILT \"/b/real\")\n",
        );
        let names: Vec<&str> = scan.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["real_NOT_BUILT"]);
        assert_eq!(scan.problems.len(), 2);
        assert!(scan.problems[0].to_string().contains("has not been built"));
        assert!(scan.problems[1].to_string().contains("not available"));
    }
}
