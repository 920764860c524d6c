//! Sequential execution of a queue of tests.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::exec::{CancelToken, Orchestrator, Verdict};
use crate::inventory::InventoryTest;
use crate::profile::Profile;

/// Progress of a batch, reported per test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Enqueued { id: String },
    Started { id: String },
    Passed { id: String, duration: Duration },
    Failed { id: String, message: String, duration: Duration },
    Skipped { id: String },
}

impl RunEvent {
    pub fn id(&self) -> &str {
        match self {
            RunEvent::Enqueued { id }
            | RunEvent::Started { id }
            | RunEvent::Passed { id, .. }
            | RunEvent::Failed { id, .. }
            | RunEvent::Skipped { id } => id,
        }
    }
}

/// Counts of finished tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Runs tests of one profile strictly one at a time.
pub struct BatchRunner<'a> {
    profile: &'a Profile,
    orchestrator: &'a Orchestrator,
    debug: bool,
}

impl<'a> BatchRunner<'a> {
    pub fn new(profile: &'a Profile, orchestrator: &'a Orchestrator) -> Self {
        Self {
            profile,
            orchestrator,
            debug: false,
        }
    }

    /// Run every test under the debugger.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Runs `tests` in order and reports every step on `events`.
    ///
    /// All tests are announced as enqueued first. Once `cancel` fires, the
    /// running test and every later one are reported as skipped.
    pub async fn run(
        &self,
        tests: &[InventoryTest],
        cancel: &CancelToken,
        events: &mpsc::UnboundedSender<RunEvent>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let emit = |event: RunEvent| {
            // A closed receiver only means nobody is listening any more.
            let _ = events.send(event);
        };

        for test in tests {
            emit(RunEvent::Enqueued {
                id: test.id.clone(),
            });
        }

        for test in tests {
            if cancel.is_cancelled() {
                summary.skipped += 1;
                emit(RunEvent::Skipped {
                    id: test.id.clone(),
                });
                continue;
            }

            emit(RunEvent::Started {
                id: test.id.clone(),
            });
            let plan = self.profile.plan_run(test, self.debug);
            debug!(test = %test.id, command = ?plan.request.command, "Running test");

            let started = Instant::now();
            let result = self.orchestrator.run(&plan.request, cancel).await;
            let duration = started.elapsed();

            if result.is_cancelled() {
                summary.skipped += 1;
                emit(RunEvent::Skipped {
                    id: test.id.clone(),
                });
                continue;
            }

            match plan.policy.verdict(&result) {
                Verdict::Passed => {
                    summary.passed += 1;
                    emit(RunEvent::Passed {
                        id: test.id.clone(),
                        duration,
                    });
                }
                Verdict::Failed(message) => {
                    summary.failed += 1;
                    emit(RunEvent::Failed {
                        id: test.id.clone(),
                        message,
                        duration,
                    });
                }
            }
        }

        info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Batch finished"
        );
        summary
    }
}
