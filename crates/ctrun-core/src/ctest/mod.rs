//! Discovery of tests registered with CTest.
//!
//! CMake writes a `CTestTestfile.cmake` into every build directory that
//! registers tests. Those files declare tests with `add_test`, attach
//! metadata with `set_tests_properties`, and pull in further files with
//! `include` and `subdirs`. This module reads that subset of the language:
//!
//! - `tokenizer` - quoting and bracket-literal aware argument splitting
//! - `parser` - file discovery and record parsing
//! - `conditions` - which `if()`/`else()` branch CMake would take
//! - `model` - `TestDefinition` and `ParseResult`

mod conditions;
mod error;
mod model;
mod parser;
mod tokenizer;

pub use error::DiscoveryError;
pub use model::{ParseResult, TestDefinition};
pub use parser::{CTestParser, CONFIGURATION_DIRS, ROOT_TEST_FILE};
pub use tokenizer::{block_end, closes_block, parse_command_line};
