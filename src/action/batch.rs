//! Batch execution of one action per machine.
//!
//! ```text
//! parallel requested ∧ every provider parallel-safe
//!   ├─ yes → one tokio task per job, joined in submission order
//!   └─ no  → jobs run one after another
//! ```
//!
//! Every job gets its own [`Environment`]. A failing job never cancels its
//! siblings; the [`BatchReport`] holds every outcome once all jobs finished.

use super::runner::{Action, RunOptions, Runner};
use crate::environment::Environment;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Job {
    action: Action,
    options: RunOptions,
}

/// Result of one batch job.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Machine the job targeted, if any.
    pub machine: Option<String>,
    /// Name of the action.
    pub action: String,
    /// The job's final environment, or its error.
    pub result: Result<Environment>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    fn describe_failure(&self) -> Option<String> {
        let err = self.result.as_ref().err()?;
        Some(match &self.machine {
            Some(machine) => format!("{machine}: {err}"),
            None => format!("{}: {err}", self.action),
        })
    }
}

/// Outcomes of a batch, in submission order.
#[derive(Debug)]
pub struct BatchReport {
    outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn outcomes(&self) -> &[BatchOutcome] {
        &self.outcomes
    }

    /// Number of failed jobs.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_ok()).count()
    }

    /// All environments, or [`Error::Batch`] listing every failure.
    pub fn into_result(self) -> Result<Vec<Environment>> {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(BatchOutcome::describe_failure)
            .collect();
        if !failures.is_empty() {
            return Err(Error::Batch { failures });
        }
        self.outcomes
            .into_iter()
            .map(|outcome| outcome.result)
            .collect()
    }
}

/// Collects jobs and runs them serially or in parallel.
pub struct Batch {
    runner: Arc<Runner>,
    parallel: bool,
    jobs: Vec<Job>,
}

impl Batch {
    /// Creates a batch. `parallel` is only honoured if every job's provider
    /// is parallel-safe.
    pub fn new(runner: Arc<Runner>, parallel: bool) -> Self {
        Self {
            runner,
            parallel,
            jobs: Vec::new(),
        }
    }

    /// Queues `action` with `options`.
    pub fn push(&mut self, action: impl Into<Action>, options: RunOptions) -> &mut Self {
        self.jobs.push(Job {
            action: action.into(),
            options,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// True if the jobs will run concurrently.
    pub fn runs_in_parallel(&self) -> bool {
        self.parallel
            && self.jobs.iter().all(|job| {
                job.options
                    .machine()
                    .is_some_and(|machine| machine.provider().parallel)
            })
    }

    /// Runs every job to completion.
    pub async fn run(self) -> BatchReport {
        let parallel = self.runs_in_parallel();
        info!(jobs = self.jobs.len(), parallel, "running batch");

        let outcomes = if parallel {
            Self::run_parallel(self.runner, self.jobs).await
        } else {
            Self::run_serial(&self.runner, self.jobs).await
        };

        let report = BatchReport { outcomes };
        if report.failures() > 0 {
            warn!(failed = report.failures(), "batch finished with failures");
        }
        report
    }

    async fn run_serial(runner: &Runner, jobs: Vec<Job>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let machine = job.options.machine().map(|m| m.name().to_string());
            let action = job.action.name().to_string();
            debug!(action = %action, machine = ?machine, "running batch job");
            let result = runner.run(job.action, job.options).await;
            outcomes.push(BatchOutcome {
                machine,
                action,
                result,
            });
        }
        outcomes
    }

    async fn run_parallel(runner: Arc<Runner>, jobs: Vec<Job>) -> Vec<BatchOutcome> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let machine = job.options.machine().map(|m| m.name().to_string());
                let action = job.action.name().to_string();
                let runner = Arc::clone(&runner);
                debug!(action = %action, machine = ?machine, "spawning batch job");
                let handle =
                    tokio::spawn(async move { runner.run(job.action, job.options).await });
                (machine, action, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (machine, action, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::Internal(format!("batch job panicked: {}", e))),
            };
            outcomes.push(BatchOutcome {
                machine,
                action,
                result,
            });
        }
        outcomes
    }
}
