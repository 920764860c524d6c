use std::fs;
use std::path::{Path, PathBuf};

use ctrun_core::exec::LaunchStore;
use ctrun_core::inventory::{split_fixture, DEFAULT_FIXTURE};
use ctrun_core::{discover, CancelToken, Config, Orchestrator, Profile, TargetKind};
use tempfile::TempDir;

#[test]
fn test_fixture_split_uses_last_separator() {
    assert_eq!(split_fixture("A::B::C", "::"), ("A::B", "C"));
    assert_eq!(split_fixture("Outer.Inner.case", "."), ("Outer.Inner", "case"));
    assert_eq!(split_fixture("no_separator", "::"), (DEFAULT_FIXTURE, "no_separator"));
}

fn cmake_config(build: &Path) -> Config {
    let mut config = Config::default();
    config.workspace.root = build.to_string_lossy().to_string();
    config.cmake.build_directory = "${workspaceFolder}".to_string();
    config
}

#[tokio::test]
async fn test_discover_from_ctest_files() {
    let temp = TempDir::new().unwrap();
    let build = temp.path();
    fs::write(
        build.join("CTestTestfile.cmake"),
        r#"add_test([=[Math.Adds]=] "/b/math" "--gtest_filter=Math.Adds")
set_tests_properties([=[Math.Adds]=] PROPERTIES TEST_FILE "/src/math.cpp" TEST_LINE "3")
add_test([=[standalone]=] "/b/other")
"#,
    )
    .unwrap();

    let profile = Profile::from_config(TargetKind::Cmake, &cmake_config(build)).unwrap();
    let orchestrator = Orchestrator::new(LaunchStore::default());
    let inventory = discover(&profile, &orchestrator, &CancelToken::new()).await;

    assert!(inventory.errors.is_empty(), "{:?}", inventory.errors);
    assert_eq!(inventory.len(), 2);

    let math = inventory.fixture("Math").unwrap();
    let adds = &math.tests[0];
    assert_eq!(adds.label, "Adds");
    assert_eq!(adds.source_file, Some(PathBuf::from("/src/math.cpp")));
    assert_eq!(adds.line, Some(3));
    assert_eq!(adds.definition.as_ref().unwrap().executable, "/b/math");

    let standalone = &inventory.fixture(DEFAULT_FIXTURE).unwrap().tests[0];
    assert_eq!(standalone.id, "standalone");
}

#[cfg(unix)]
#[tokio::test]
async fn test_discover_by_listing_executable() {
    let temp = TempDir::new().unwrap();
    let build = temp.path();
    fs::write(
        build.join("list.sh"),
        "echo 'Parser::parses_empty,src/parser.cpp,10'\n\
         echo 'warning: not a test line'\n\
         echo 'Parser::Nested::deep,src/parser.cpp,20'\n",
    )
    .unwrap();

    let mut config = Config::default();
    let dir = build.to_string_lossy().to_string();
    config.workspace.root = dir.clone();
    let target = &mut config.targets.executable;
    target.executable = "/bin/sh".to_string();
    target.build_directory = dir.clone();
    target.src_directory = dir;
    target.list_test_arg_pattern = "${executable} ${buildDirectory}/list.sh".to_string();

    let profile = Profile::from_config(TargetKind::Executable, &config).unwrap();
    let orchestrator = Orchestrator::new(LaunchStore::default());
    let inventory = discover(&profile, &orchestrator, &CancelToken::new()).await;

    assert!(inventory.errors.is_empty(), "{:?}", inventory.errors);
    let ids: Vec<&str> = inventory.tests().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["Parser::parses_empty", "Parser::Nested::deep"]);

    let deep = &inventory.fixture("Parser::Nested").unwrap().tests[0];
    assert_eq!(deep.label, "deep");
    assert_eq!(deep.source_file, Some(build.join("src/parser.cpp")));
    assert_eq!(deep.line, Some(20));
}

#[tokio::test]
async fn test_discover_reports_failed_listing() {
    let temp = TempDir::new().unwrap();
    let build = temp.path();

    let mut config = cmake_config(build);
    config.targets.cmake.list_test_arg_pattern = "${buildDirectory}/missing_lister".to_string();

    let profile = Profile::from_config(TargetKind::Cmake, &config).unwrap();
    let orchestrator = Orchestrator::new(LaunchStore::default());
    let inventory = discover(&profile, &orchestrator, &CancelToken::new()).await;

    assert!(inventory.is_empty());
    assert_eq!(inventory.errors.len(), 2);
    assert!(inventory.errors[0].starts_with("No CTest files found"));
}

#[test]
fn test_inventory_json_omits_definitions() {
    let text = "Math::adds,math.cpp,3\n";
    let inventory = ctrun_core::Inventory::from_list_output(text, &["::"], Path::new("/src"));
    let json = serde_json::to_value(&inventory).unwrap();

    let test = &json["fixtures"][0]["tests"][0];
    assert_eq!(test["id"], "Math::adds");
    assert_eq!(test["line"], 3);
    assert!(test.get("definition").is_none());
}

#[tokio::test]
async fn test_cmake_fallback_without_list_command_explains() {
    let temp = TempDir::new().unwrap();
    let profile = Profile::from_config(TargetKind::Cmake, &cmake_config(temp.path())).unwrap();
    let orchestrator = Orchestrator::new(LaunchStore::default());
    let inventory = discover(&profile, &orchestrator, &CancelToken::new()).await;

    assert!(inventory.is_empty());
    assert_eq!(inventory.errors.len(), 2);
    assert!(inventory.errors[0].starts_with("No CTest files found"));
    assert!(inventory.errors[1].contains("list_test_arg_pattern"), "{:?}", inventory.errors);
}
