// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use tokio::time::{Instant, sleep};

use crate::config::{PollingPolicy, SessionConfig, TransferSpec};
use crate::error::JobError;
use crate::exec::{ExecLimits, ProcessExecutor};
use crate::pbs::{JobHandle, JobState, StatusPoller, Submitter};
use crate::relay::RelaySession;
use crate::transfer::TransferEngine;

/// Where a run currently stands. Transitions are one-directional and no
/// state is re-entered; cancellation branches off from `Submitted` or
/// `Polling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    FilesStaged,
    Submitted,
    Polling,
    Completed,
    TimedOut,
    FilesRetrieved,
    Done,
    Cancelling,
    Cancelled,
}

impl LifecycleState {
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, FilesStaged)
                | (FilesStaged, Submitted)
                | (Submitted, Polling)
                | (Submitted, Cancelling)
                | (Polling, Completed)
                | (Polling, TimedOut)
                | (Polling, Cancelling)
                | (Completed, FilesRetrieved)
                | (FilesRetrieved, Done)
                | (Cancelling, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Done | LifecycleState::TimedOut | LifecycleState::Cancelled
        )
    }
}

fn advance(state: &mut LifecycleState, next: LifecycleState) {
    debug_assert!(state.can_advance_to(next));
    log::debug!("lifecycle {:?} -> {:?}", *state, next);
    *state = next;
}

/// Drives one job through stage, submit, poll, retrieve. An instance manages
/// exactly one job and `run` consumes it; clone the controller first if an
/// out-of-band `cancel` may be needed while the run is in flight.
#[derive(Clone)]
pub struct JobController {
    executor: Arc<dyn ProcessExecutor>,
    config: SessionConfig,
    limits: ExecLimits,
}

impl JobController {
    pub fn new(executor: Arc<dyn ProcessExecutor>, config: SessionConfig) -> Self {
        Self {
            executor,
            config,
            limits: ExecLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ExecLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Stage inputs, submit, poll until the job finishes or the completion
    /// timeout elapses, then retrieve and verify outputs. Returns the job
    /// handle for audit. The first failure short-circuits the remaining
    /// steps.
    pub async fn run(
        self,
        spec: &TransferSpec,
        policy: &PollingPolicy,
    ) -> Result<JobHandle, JobError> {
        self.config.validate()?;
        let mut state = LifecycleState::Idle;

        let transfer = TransferEngine::new(self.executor.clone());
        transfer.push(&spec.inputs, &self.config, &self.limits).await?;
        advance(&mut state, LifecycleState::FilesStaged);

        let handle = Submitter::new(self.executor.clone())
            .submit(
                &self.config.qsub_filepath,
                &self.config.qsub_options,
                &self.config,
                &self.limits,
            )
            .await?;
        advance(&mut state, LifecycleState::Submitted);

        let poller = StatusPoller::new(self.executor.clone());
        advance(&mut state, LifecycleState::Polling);

        // the timeout clock starts with the poll loop, not at submission
        let started = Instant::now();
        loop {
            let status = poller.status(&handle, &self.config, &self.limits).await?;
            if status == JobState::Finished {
                advance(&mut state, LifecycleState::Completed);
                break;
            }
            sleep(policy.poll_interval).await;
            if !policy.completion_timeout.is_zero()
                && started.elapsed() > policy.completion_timeout
            {
                advance(&mut state, LifecycleState::TimedOut);
                // the remote job keeps running; cancelling it is the
                // caller's explicit decision
                log::warn!(
                    "job {handle} still {status} after {:?}",
                    policy.completion_timeout
                );
                return Err(JobError::CompletionTimeout {
                    timeout: policy.completion_timeout,
                });
            }
        }

        transfer.pull(&spec.outputs, &self.config, &self.limits).await?;
        advance(&mut state, LifecycleState::FilesRetrieved);

        advance(&mut state, LifecycleState::Done);
        log::info!("job {handle} finished; outputs retrieved");
        Ok(handle)
    }

    /// Ask the scheduler to delete the job. Issues exactly one `qdel` and
    /// does not wait for the scheduler to act on it; callers wanting
    /// confirmation poll `status` until it reports finished.
    pub async fn cancel(&self, handle: &JobHandle) -> Result<(), JobError> {
        let command = RelaySession::new(&self.config)
            .ssh(vec!["qdel".to_string(), handle.job_id.clone()]);
        let capture = self.executor.run(&command, &self.limits).await?;
        if capture.exit_code != 0 {
            log::warn!(
                "qdel for job {} exited with {}: {}",
                handle.job_id,
                capture.exit_code,
                capture.stderr_text().trim()
            );
        }
        Ok(())
    }

    /// One-off status query for a handle obtained earlier.
    pub async fn status(&self, handle: &JobHandle) -> Result<JobState, JobError> {
        StatusPoller::new(self.executor.clone())
            .status(handle, &self.config, &self.limits)
            .await
    }
}

/// Non-fatal companion to [`SessionConfig::validate`]: collect every
/// configuration problem and missing input file as human-readable lines,
/// for operator diagnosis before a run.
pub fn preflight_report(config: &SessionConfig, spec: &TransferSpec) -> Vec<String> {
    let mut report = Vec::new();
    for (option, value) in config.required_options() {
        if value.is_empty() {
            report.push(format!("the option '{option}' cannot be empty"));
        }
    }
    for path in &spec.inputs {
        if !path.exists() {
            report.push(format!("the input file {} is missing", path.display()));
        }
    }
    report
}
