use std::time::Instant;

use super::report::{
    RunReport,
    StepOutcome,
};
use super::{
    Action,
    FailurePolicy,
    RunState,
    Step,
    StepState,
};
use crate::errors::ProvError;

/// Carries out a single action. Implementations are responsible for
/// making their actions idempotent or detect-and-skip.
pub trait Executor {
    fn execute(&mut self, step_name: &str, action: &Action) -> Result<(), ProvError>;
}

/// Runs steps strictly in order, each at most once.
/// Failed steps are never retried.
pub struct Orchestrator<'a, E: Executor> {
    executor: &'a mut E,
}

impl<'a, E: Executor> Orchestrator<'a, E> {
    pub fn new(executor: &'a mut E) -> Self {
        Self { executor }
    }

    pub fn run(&mut self, steps: &[Step]) -> RunReport {
        let start = Instant::now();

        let mut outcomes: Vec<StepOutcome> = steps.iter().map(StepOutcome::pending).collect();
        let mut state = RunState::InProgress;

        for (i, step) in steps.iter().enumerate() {
            let outcome = &mut outcomes[i];
            outcome.state = StepState::Running;

            log::info!("[{}/{}] {}", i + 1, steps.len(), step.name);

            let step_start = Instant::now();
            let result = self.executor.execute(&step.name, &step.action);
            outcome.duration = step_start.elapsed();

            let (err, policy) = match result {
                Ok(()) => {
                    outcome.state = StepState::Succeeded;
                    log::info!("{} succeeded in {:?}", step.name, outcome.duration);
                    continue;
                }
                Err(err) => {
                    if err.is_planning() {
                        log::info!("{}: no destructive command was issued", step.name);
                    }

                    let policy = match err.is_always_fatal() {
                        true => FailurePolicy::Fatal,
                        false => step.failure_policy,
                    };

                    let err = ProvError::StepError {
                        step: step.name.clone(),
                        cause: Box::new(err),
                    };

                    (err, policy)
                }
            };

            if policy != step.failure_policy {
                log::warn!(
                    "{}: overriding {} policy, error is fatal",
                    step.name,
                    step.failure_policy
                );
            }

            outcome.state = StepState::Failed;
            outcome.policy = policy;
            outcome.error = Some(err.to_string());

            match policy {
                FailurePolicy::WarnAndContinue => {
                    log::warn!("{err}, continuing");
                }
                FailurePolicy::Fatal => {
                    log::error!("{err}, aborting");
                    state = RunState::Aborted;
                    break;
                }
            }
        }

        if state == RunState::InProgress {
            state = RunState::Completed;
        }

        RunReport {
            state,
            outcomes,
            duration: start.elapsed(),
        }
    }
}
