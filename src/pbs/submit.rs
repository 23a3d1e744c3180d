use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::JobError;
use crate::exec::{ExecLimits, ProcessExecutor};
use crate::relay::RelaySession;

use super::JobHandle;

/// Submits the scheduler job file through the relay and recovers the job
/// handle from the submission transcript.
pub struct Submitter {
    executor: Arc<dyn ProcessExecutor>,
}

impl Submitter {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    pub async fn submit(
        &self,
        qsub_filepath: &str,
        qsub_options: &str,
        config: &SessionConfig,
        limits: &ExecLimits,
    ) -> Result<JobHandle, JobError> {
        let mut words = vec!["qsub".to_string()];
        words.extend(qsub_options.split_whitespace().map(str::to_string));
        words.push(qsub_filepath.to_string());

        let command = RelaySession::new(config).ssh(words);
        let capture = self.executor.run(&command, limits).await?;

        match parse_job_handle(&capture.stdout_text(), &config.hostname) {
            Some(handle) => {
                log::info!("submitted job {handle}");
                Ok(handle)
            }
            None => Err(JobError::Submission {
                command: command.to_string(),
            }),
        }
    }
}

/// Find the job handle in submission output. The scheduler prints the new
/// job's dotted name, e.g. `1044002.pbspl1.nas.nasa.gov`; the first line
/// containing the configured hostname that yields two non-empty leading
/// components wins.
pub fn parse_job_handle(stdout: &str, hostname: &str) -> Option<JobHandle> {
    stdout
        .lines()
        .filter(|line| line.contains(hostname))
        .find_map(|line| {
            let mut parts = line.trim().split('.');
            let job_id = parts.next()?.trim();
            let server = parts.next()?.trim();
            if job_id.is_empty() || server.is_empty() {
                return None;
            }
            Some(JobHandle {
                job_id: job_id.to_string(),
                server: server.to_string(),
            })
        })
}
