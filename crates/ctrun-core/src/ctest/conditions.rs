//! Branch selection for the `if()` blocks CMake writes into registration files.
//!
//! Generated files use two shapes. Multi-configuration generators declare each
//! test once per `CTEST_CONFIGURATION_TYPE MATCHES` branch with an `else()`
//! fallback pointing at `NOT_AVAILABLE`. `gtest_discover_tests` include files
//! guard the discovered list with `if(EXISTS ...)` and register a
//! `<target>_NOT_BUILT` test in the `else()` branch. Only the lines of the
//! branch CMake would take are handed to the parser.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::tokenizer::parse_command_line;

static CONDITIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(if|elseif|else|endif)\s*\((.*)\)\s*$").expect("conditional pattern")
});

const CONFIGURATION_VARIABLE: &str = "CTEST_CONFIGURATION_TYPE";

#[derive(Debug, Clone, Copy)]
struct Frame {
    parent_active: bool,
    taken: bool,
    active: bool,
}

/// Decides which lines of a file are live.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Branches<'a> {
    base: &'a Path,
    build_type: Option<&'a str>,
}

impl<'a> Branches<'a> {
    /// `base` resolves relative `EXISTS` paths. Without a `build_type` the
    /// first configuration branch is taken.
    pub(crate) fn new(base: &'a Path, build_type: Option<&'a str>) -> Self {
        Self {
            base,
            build_type: build_type.filter(|b| !b.is_empty()),
        }
    }

    /// Lines of `content` inside taken branches, trimmed, with 1-based line
    /// numbers. The `if`/`else`/`endif` lines themselves are dropped.
    pub(crate) fn active_lines<'c>(&self, content: &'c str) -> Vec<(usize, &'c str)> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut lines = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            let active = stack.last().map_or(true, |f| f.active);

            let Some(caps) = CONDITIONAL.captures(line) else {
                if active {
                    lines.push((index + 1, line));
                }
                continue;
            };

            let condition = caps.get(2).map_or("", |m| m.as_str());
            match caps[1].to_ascii_lowercase().as_str() {
                "if" => {
                    let holds = active && self.holds(condition);
                    stack.push(Frame {
                        parent_active: active,
                        taken: holds,
                        active: holds,
                    });
                }
                "elseif" => {
                    if let Some(frame) = stack.last_mut() {
                        frame.active =
                            frame.parent_active && !frame.taken && self.holds(condition);
                        frame.taken |= frame.active;
                    }
                }
                "else" => {
                    if let Some(frame) = stack.last_mut() {
                        frame.active = frame.parent_active && !frame.taken;
                        frame.taken = true;
                    }
                }
                _ => {
                    stack.pop();
                }
            }
        }

        lines
    }

    fn holds(&self, condition: &str) -> bool {
        self.evaluate(&parse_command_line(condition))
    }

    /// Conditions outside the generated subset are assumed to hold.
    fn evaluate(&self, tokens: &[String]) -> bool {
        match tokens {
            [not, rest @ ..] if not == "NOT" => !self.evaluate(rest),
            [op, path] if op == "EXISTS" => self.resolve(path).exists(),
            [var, op, pattern] if var == CONFIGURATION_VARIABLE && op == "MATCHES" => {
                match self.build_type {
                    Some(build_type) => Regex::new(pattern).is_ok_and(|re| re.is_match(build_type)),
                    None => true,
                }
            }
            _ => true,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_relative() {
            self.base.join(path)
        } else {
            path.to_path_buf()
        }
    }
}
