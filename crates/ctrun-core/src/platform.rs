//! Host operating system facts used for path handling and process launch.

use serde::{Deserialize, Serialize};

/// Operating system a command line or environment is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Windows,
    Linux,
    MacOs,
    /// Any other Unix-like system.
    Unix,
}

impl TargetOs {
    /// The operating system this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(windows) {
            TargetOs::Windows
        } else if cfg!(target_os = "macos") {
            TargetOs::MacOs
        } else if cfg!(target_os = "linux") {
            TargetOs::Linux
        } else {
            TargetOs::Unix
        }
    }

    pub fn is_windows(self) -> bool {
        self == TargetOs::Windows
    }

    /// Separator between entries of a search-path list variable.
    pub fn path_list_separator(self) -> char {
        if self.is_windows() {
            ';'
        } else {
            ':'
        }
    }

    /// Environment variable the dynamic loader consults for shared libraries.
    pub fn library_path_var(self) -> &'static str {
        match self {
            TargetOs::Windows => "PATH",
            TargetOs::MacOs => "DYLD_LIBRARY_PATH",
            TargetOs::Linux | TargetOs::Unix => "LD_LIBRARY_PATH",
        }
    }

    /// Rewrites every path separator into the native one.
    pub fn normalize_separators(self, path: &str) -> String {
        if self.is_windows() {
            path.replace('/', "\\")
        } else {
            path.replace('\\', "/")
        }
    }

    /// Debugger backend preferred on this platform when no launch profile names one.
    pub fn preferred_debugger(self) -> &'static str {
        match self {
            TargetOs::MacOs => "lldb",
            _ => "gdb",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators() {
        assert_eq!(TargetOs::Windows.normalize_separators("a/b\\c"), "a\\b\\c");
        assert_eq!(TargetOs::Linux.normalize_separators("a/b\\c"), "a/b/c");
        assert_eq!(TargetOs::Windows.path_list_separator(), ';');
        assert_eq!(TargetOs::MacOs.path_list_separator(), ':');
    }

    #[test]
    fn test_library_path_var() {
        assert_eq!(TargetOs::Windows.library_path_var(), "PATH");
        assert_eq!(TargetOs::Linux.library_path_var(), "LD_LIBRARY_PATH");
        assert_eq!(TargetOs::MacOs.library_path_var(), "DYLD_LIBRARY_PATH");
    }
}
