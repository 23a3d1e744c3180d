// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::JobError;
use crate::exec::{ExecLimits, ProcessExecutor};
use crate::relay::RelaySession;

use super::JobHandle;

const FINISHED_PHRASE: &str = "Job has finished";
const STATE_TOKEN: &str = "job_state =";

/// Lifecycle state of a scheduled job as reported by the status query.
/// `Finished` is the only terminal state; `Unknown` covers scheduler codes
/// this crate does not map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Exiting,
    Finished,
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished)
    }

    fn from_code(code: &str) -> Self {
        match code {
            "Q" => JobState::Queued,
            "R" => JobState::Running,
            "E" => JobState::Exiting,
            "F" => JobState::Finished,
            _ => JobState::Unknown,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Exiting => "exiting",
            JobState::Finished => "finished",
            JobState::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Classify a status-query transcript. The stderr signal is checked first:
/// the scheduler reports "Job has finished" there even after the job has
/// aged out of its active table, when stdout carries nothing useful.
pub fn classify(stdout: &str, stderr: &str) -> Option<JobState> {
    if let Some(first) = stderr.lines().next() {
        if first.contains(FINISHED_PHRASE) {
            return Some(JobState::Finished);
        }
    }
    for line in stdout.lines() {
        if let Some((_, rest)) = line.split_once(STATE_TOKEN) {
            let code = rest.trim().split_whitespace().next().unwrap_or("");
            return Some(JobState::from_code(code));
        }
    }
    None
}

/// Issues `qstat -f` for a job handle and maps the transcript to a
/// [`JobState`].
pub struct StatusPoller {
    executor: Arc<dyn ProcessExecutor>,
}

impl StatusPoller {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    pub async fn status(
        &self,
        handle: &JobHandle,
        config: &SessionConfig,
        limits: &ExecLimits,
    ) -> Result<JobState, JobError> {
        let command = RelaySession::new(config).ssh(vec![
            "qstat".to_string(),
            "-f".to_string(),
            handle.qualified(&config.hostname),
        ]);
        let capture = self.executor.run(&command, limits).await?;

        match classify(&capture.stdout_text(), &capture.stderr_text()) {
            Some(state) => {
                log::debug!("job {handle} is {state}");
                Ok(state)
            }
            // neither signal present: a relay or parsing fault, not a
            // transient scheduler state, so this is not retried
            None => Err(JobError::StatusUnknown {
                job_id: handle.job_id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExecutor;

    fn handle() -> JobHandle {
        JobHandle {
            job_id: "1044002".to_string(),
            server: "pbspl1".to_string(),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            hostname: "nas.nasa.gov".to_string(),
            working_directory: "/nobackup/run1".to_string(),
            qsub_filepath: "job.pbs".to_string(),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn finished_phrase_on_stderr_wins_over_stdout() {
        let stderr =
            "qstat: 1044002.pbspl1.nas.nasa.gov Job has finished, use -x or -H to obtain historical job information\n";
        let stdout = "    job_state = R\n";
        assert_eq!(classify(stdout, stderr), Some(JobState::Finished));
    }

    #[test]
    fn finished_phrase_only_counts_on_the_first_stderr_line() {
        let stderr = "warning: something else\nJob has finished\n";
        assert_eq!(classify("    job_state = Q\n", stderr), Some(JobState::Queued));
    }

    #[test]
    fn job_state_codes_map_to_states() {
        assert_eq!(classify("    job_state = Q\n", ""), Some(JobState::Queued));
        assert_eq!(classify("    job_state = R\n", ""), Some(JobState::Running));
        assert_eq!(classify("    job_state = E\n", ""), Some(JobState::Exiting));
        assert_eq!(classify("    job_state = F\n", ""), Some(JobState::Finished));
        assert_eq!(classify("    job_state = H\n", ""), Some(JobState::Unknown));
    }

    #[test]
    fn state_line_is_found_inside_full_qstat_output() {
        let stdout = "\
Job Id: 1044002.pbspl1.nas.nasa.gov
    Job_Name = sup_test
    job_state = R
    queue = devel
";
        assert_eq!(classify(stdout, ""), Some(JobState::Running));
    }

    #[test]
    fn no_signal_classifies_as_none() {
        assert_eq!(classify("", ""), None);
        assert_eq!(classify("Job Id: 1044002\n", "qstat: connection refused\n"), None);
    }

    #[test]
    fn only_finished_is_terminal() {
        assert!(JobState::Finished.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }

    #[tokio::test]
    async fn status_builds_qualified_qstat_command() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.enqueue("    job_state = Q\n", "", 0);

        let state = StatusPoller::new(executor.clone())
            .status(&handle(), &config(), &ExecLimits::default())
            .await
            .unwrap();
        assert_eq!(state, JobState::Queued);

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec![
                "ssh",
                "nas.nasa.gov",
                "qstat",
                "-f",
                "1044002.pbspl1.nas.nasa.gov"
            ]
        );
    }

    #[tokio::test]
    async fn unknown_status_is_a_fatal_error() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.enqueue("", "", 0);

        let err = StatusPoller::new(executor)
            .status(&handle(), &config(), &ExecLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::StatusUnknown { job_id } if job_id == "1044002"));
    }
}
