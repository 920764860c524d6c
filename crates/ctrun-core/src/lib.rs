pub mod batch;
pub mod config;
pub mod ctest;
pub mod exec;
pub mod inventory;
pub mod platform;
pub mod profile;
pub mod template;

pub use batch::{BatchRunner, BatchSummary, RunEvent};
pub use config::{Config, ConfigError};
pub use ctest::{CTestParser, ParseResult, TestDefinition};
pub use exec::{CancelToken, ExecutionResult, Orchestrator, PassPolicy, RunRequest};
pub use inventory::{discover, Inventory, InventoryTest};
pub use platform::TargetOs;
pub use profile::{Profile, TargetKind};
pub use template::TemplateResolver;
