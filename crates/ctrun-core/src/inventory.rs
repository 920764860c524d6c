//! The fixture → test case tree shown to users.
//!
//! An [`Inventory`] is rebuilt from scratch on every discovery pass, either
//! from CTest registration files or from the list output of the test
//! executable, and fully replaces the previous one.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::ctest::{ParseResult, TestDefinition};
use crate::exec::{CancelToken, Orchestrator, RunState};
use crate::profile::Profile;

/// Fixture that collects tests whose names carry no separator.
pub const DEFAULT_FIXTURE: &str = "default";

/// Splits `name` at the last occurrence of `separator` into fixture and case.
///
/// Names without the separator belong to [`DEFAULT_FIXTURE`].
pub fn split_fixture<'a>(name: &'a str, separator: &str) -> (&'a str, &'a str) {
    if separator.is_empty() {
        return (DEFAULT_FIXTURE, name);
    }
    match name.rfind(separator) {
        Some(idx) => (&name[..idx], &name[idx + separator.len()..]),
        None => (DEFAULT_FIXTURE, name),
    }
}

/// Splits on the first separator of `separators` that occurs in `name`.
pub fn split_fixture_any<'a, S: AsRef<str>>(name: &'a str, separators: &[S]) -> (&'a str, &'a str) {
    separators
        .iter()
        .map(AsRef::as_ref)
        .find(|sep| !sep.is_empty() && name.contains(*sep))
        .map(|sep| split_fixture(name, sep))
        .unwrap_or((DEFAULT_FIXTURE, name))
}

/// One runnable test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryTest {
    /// Fully-qualified name; unique within an inventory.
    pub id: String,
    pub fixture: String,
    /// Case name shown inside the fixture.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Registered CTest command, when discovered from CTest files.
    #[serde(skip)]
    pub definition: Option<TestDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fixture {
    pub name: String,
    pub tests: Vec<InventoryTest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub fixtures: Vec<Fixture>,
    /// Problems met while discovering; the tests found are still usable.
    pub errors: Vec<String>,
}

impl Inventory {
    /// Builds an inventory from `<name>,<file>,<line>` lines.
    ///
    /// Lines without a comma are ignored. Relative source files are joined
    /// onto `base_dir`.
    pub fn from_list_output<S: AsRef<str>>(text: &str, separators: &[S], base_dir: &Path) -> Self {
        let mut inventory = Inventory::default();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !line.contains(',') {
                continue;
            }
            let mut parts = line.split(',');
            let name = parts.next().unwrap_or_default().trim();
            if name.is_empty() {
                continue;
            }
            let source_file = parts
                .next()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(|f| {
                    let path = Path::new(f);
                    if path.is_absolute() {
                        path.to_path_buf()
                    } else {
                        base_dir.join(path)
                    }
                });
            let line_no = parts.next().and_then(|l| l.trim().parse().ok());

            let (fixture, label) = split_fixture_any(name, separators);
            inventory.insert(InventoryTest {
                id: name.to_string(),
                fixture: fixture.to_string(),
                label: label.to_string(),
                source_file,
                line: line_no,
                definition: None,
            });
        }

        inventory
    }

    /// Builds an inventory from CTest definitions, keeping each definition
    /// for execution.
    pub fn from_parse_result<S: AsRef<str>>(result: ParseResult, separators: &[S]) -> Self {
        let mut inventory = Inventory {
            fixtures: Vec::new(),
            errors: result.errors,
        };

        for definition in result.tests {
            let id = definition.qualified_name().to_string();
            let (fixture, label) = split_fixture_any(&id, separators);
            let (fixture, label) = (fixture.to_string(), label.to_string());
            inventory.insert(InventoryTest {
                source_file: definition.test_file.as_deref().map(PathBuf::from),
                line: definition.test_line,
                id,
                fixture,
                label,
                definition: Some(definition),
            });
        }

        inventory
    }

    /// Adds a test; a test with the same id replaces the earlier one.
    pub fn insert(&mut self, test: InventoryTest) {
        for fixture in &mut self.fixtures {
            if let Some(existing) = fixture.tests.iter_mut().find(|t| t.id == test.id) {
                *existing = test;
                return;
            }
        }

        match self.fixtures.iter_mut().find(|f| f.name == test.fixture) {
            Some(fixture) => fixture.tests.push(test),
            None => self.fixtures.push(Fixture {
                name: test.fixture.clone(),
                tests: vec![test],
            }),
        }
    }

    pub fn tests(&self) -> impl Iterator<Item = &InventoryTest> {
        self.fixtures.iter().flat_map(|f| f.tests.iter())
    }

    pub fn len(&self) -> usize {
        self.fixtures.iter().map(|f| f.tests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fixture(&self, name: &str) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.name == name)
    }

    /// Tests matching any of `filters`, in inventory order.
    ///
    /// A filter equal to a fixture name selects the whole fixture; otherwise
    /// it selects tests whose id contains it. No filters selects everything.
    pub fn select(&self, filters: &[String]) -> Vec<InventoryTest> {
        if filters.is_empty() {
            return self.tests().cloned().collect();
        }
        self.tests()
            .filter(|t| {
                filters
                    .iter()
                    .any(|f| t.fixture == *f || t.id.contains(f.as_str()))
            })
            .cloned()
            .collect()
    }
}

/// Discovers the tests of `profile`.
///
/// CTest registration files are used when the profile has a build session
/// that asks for them. When they yield no tests, or for other targets, the
/// list command is run through `orchestrator`.
pub async fn discover(
    profile: &Profile,
    orchestrator: &Orchestrator,
    cancel: &CancelToken,
) -> Inventory {
    let mut earlier_errors = Vec::new();

    if let Some(session) = profile.session().filter(|s| s.uses_ctest_discovery()) {
        let result = session.parse_tests();
        for err in &result.errors {
            warn!("{err}");
        }
        if !result.tests.is_empty() {
            debug!(tests = result.tests.len(), "Discovered tests from CTest files");
            return Inventory::from_parse_result(result, profile.fixture_separators());
        }
        warn!("No CTest registrations found, listing tests through the executable");
        earlier_errors = result.errors;
    }

    let request = match profile.list_request() {
        Ok(request) => request,
        Err(e) => {
            warn!("{e}");
            earlier_errors.push(e.to_string());
            return Inventory {
                fixtures: Vec::new(),
                errors: earlier_errors,
            };
        }
    };
    let result = orchestrator.run(&request, cancel).await;
    let mut inventory = match result.state {
        RunState::Completed => Inventory::from_list_output(
            &result.text,
            profile.fixture_separators(),
            profile.build_directory(),
        ),
        _ => Inventory {
            fixtures: Vec::new(),
            errors: vec![result.text],
        },
    };
    earlier_errors.append(&mut inventory.errors);
    inventory.errors = earlier_errors;
    inventory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_last_separator() {
        assert_eq!(split_fixture("A::B::C", "::"), ("A::B", "C"));
        assert_eq!(split_fixture("plain", "::"), (DEFAULT_FIXTURE, "plain"));
        assert_eq!(split_fixture("Suite.case", "."), ("Suite", "case"));
    }

    #[test]
    fn test_split_any_uses_first_present_separator() {
        let seps = ["::", "."];
        assert_eq!(split_fixture_any("ns::Suite.v2", &seps), ("ns", "Suite.v2"));
        assert_eq!(split_fixture_any("Math.Adds", &seps), ("Math", "Adds"));
        assert_eq!(split_fixture_any("lonely", &seps), (DEFAULT_FIXTURE, "lonely"));
    }

    #[test]
    fn test_from_list_output() {
        let text = "\
Math::Adds,src/math.cpp,12
Math::Subs,/abs/math.cpp,20
noise without comma
Lonely,,
";
        let inv = Inventory::from_list_output(text, &["::"], Path::new("/b"));
        assert_eq!(inv.len(), 3);
        assert_eq!(inv.fixtures[0].name, "Math");
        let adds = &inv.fixtures[0].tests[0];
        assert_eq!(adds.label, "Adds");
        assert_eq!(adds.source_file, Some(PathBuf::from("/b/src/math.cpp")));
        assert_eq!(adds.line, Some(12));
        assert_eq!(
            inv.fixtures[0].tests[1].source_file,
            Some(PathBuf::from("/abs/math.cpp"))
        );
        let lonely = &inv.fixture(DEFAULT_FIXTURE).unwrap().tests[0];
        assert_eq!(lonely.id, "Lonely");
        assert_eq!(lonely.source_file, None);
        assert_eq!(lonely.line, None);
    }

    #[test]
    fn test_duplicate_ids_replace() {
        let text = "A::x,f.cpp,1\nA::x,f.cpp,9\n";
        let inv = Inventory::from_list_output(text, &["::"], Path::new("/"));
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.tests().next().unwrap().line, Some(9));
    }

    #[test]
    fn test_from_parse_result_keeps_definitions() {
        let mut definition = TestDefinition::new("Math.Adds", "/b/t", Vec::new());
        definition.test_file = Some("/src/math.cpp".to_string());
        definition.test_line = Some(7);
        let result = ParseResult {
            tests: vec![definition.clone()],
            errors: vec!["bad file".to_string()],
        };

        let inv = Inventory::from_parse_result(result, &["::", "."]);
        assert_eq!(inv.errors, vec!["bad file"]);
        let test = inv.tests().next().unwrap();
        assert_eq!(test.fixture, "Math");
        assert_eq!(test.label, "Adds");
        assert_eq!(test.line, Some(7));
        assert_eq!(test.definition.as_ref(), Some(&definition));
    }

    #[test]
    fn test_select() {
        let text = "Math::Adds,f,1\nMath::Subs,f,2\nIo::Reads,f,3\n";
        let inv = Inventory::from_list_output(text, &["::"], Path::new("/"));
        assert_eq!(inv.select(&[]).len(), 3);
        assert_eq!(inv.select(&["Math".to_string()]).len(), 2);
        let reads = inv.select(&["Reads".to_string()]);
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].id, "Io::Reads");
    }
}
