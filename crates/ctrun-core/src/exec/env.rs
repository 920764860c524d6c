//! Environment construction for launched test processes.

use std::collections::BTreeMap;

use crate::platform::TargetOs;

/// Environment of a child process, keyed by variable name.
pub type Environment = BTreeMap<String, String>;

/// Snapshot of this process's environment. Non-UTF-8 entries are converted lossily.
pub fn inherited_environment() -> Environment {
    std::env::vars_os()
        .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
        .collect()
}

/// Joins library directories with the native list separator.
///
/// Entries may themselves hold several directories separated by `;`, the way
/// they are usually written in configuration files. Empty entries are dropped.
pub fn join_library_paths(lib_paths: &[String], os: TargetOs) -> String {
    let separator = os.path_list_separator().to_string();
    lib_paths
        .iter()
        .flat_map(|entry| entry.split(';'))
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(|dir| os.normalize_separators(dir))
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Builds the environment for a child process.
///
/// Returns a copy of `inherited` with `lib_paths` prepended to the loader
/// search variable of `os`. On Windows the existing `PATH` entry is found
/// case-insensitively and keeps its original spelling.
pub fn build_environment(
    inherited: &Environment,
    lib_paths: &[String],
    os: TargetOs,
) -> Environment {
    let mut env = inherited.clone();
    let prefix = join_library_paths(lib_paths, os);
    if prefix.is_empty() {
        return env;
    }

    let wanted = os.library_path_var();
    let key = if os.is_windows() {
        env.keys()
            .find(|k| k.eq_ignore_ascii_case(wanted))
            .cloned()
            .unwrap_or_else(|| wanted.to_string())
    } else {
        wanted.to_string()
    };

    let value = match env.get(&key) {
        Some(existing) if !existing.is_empty() => {
            format!("{prefix}{}{existing}", os.path_list_separator())
        }
        _ => prefix,
    };
    env.insert(key, value);
    env
}
