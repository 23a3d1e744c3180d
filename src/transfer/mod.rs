// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod verify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::{FileStage, JobError};
use crate::exec::{ExecLimits, ProcessExecutor};
use crate::relay::RelaySession;

pub use verify::TransferOutcome;

/// Moves files across the relay boundary and proves they arrived by
/// inspecting the copy tool's transcript.
pub struct TransferEngine {
    executor: Arc<dyn ProcessExecutor>,
}

impl TransferEngine {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    /// Stage local files into the remote working directory with one batched
    /// copy invocation. Any locally missing file fails the whole push before
    /// a process is spawned.
    pub async fn push(
        &self,
        files: &[PathBuf],
        config: &SessionConfig,
        limits: &ExecLimits,
    ) -> Result<(), JobError> {
        if files.is_empty() {
            return Ok(());
        }

        let missing = missing_paths(files);
        if !missing.is_empty() {
            return Err(JobError::MissingFiles {
                stage: FileStage::Input,
                paths: missing,
            });
        }

        let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let mut copy_args = names.clone();
        copy_args.push(config.remote_destination());

        let command = RelaySession::new(config).copy(copy_args);
        let capture = self.executor.run(&command, limits).await?;
        if capture.exit_code != 0 {
            return Err(JobError::CopyFailed {
                code: capture.exit_code,
                stderr: capture.stderr_text().trim().to_string(),
            });
        }

        // exit code 0 does not imply success; the transcript is authoritative
        let outcome = verify::check(&capture.stderr_text(), &names);
        if !outcome.is_verified() {
            return Err(JobError::TransferVerification {
                files: outcome.into_failed(),
            });
        }

        log::info!(
            "staged {} input file(s) to {}",
            names.len(),
            config.remote_destination()
        );
        Ok(())
    }

    /// Retrieve files from the remote working directory, one copy invocation
    /// per file so a single bad path cannot poison the rest, then re-check
    /// that every requested file actually exists locally.
    pub async fn pull(
        &self,
        files: &[PathBuf],
        config: &SessionConfig,
        limits: &ExecLimits,
    ) -> Result<(), JobError> {
        if files.is_empty() {
            return Ok(());
        }

        let relay = RelaySession::new(config);
        for file in files {
            let source = format!("{}/{}", config.remote_destination(), file.display());
            let target = local_target(file);
            let command = relay.copy(vec![source, target]);

            let capture = self.executor.run(&command, limits).await?;
            if capture.exit_code != 0 {
                return Err(JobError::CopyFailed {
                    code: capture.exit_code,
                    stderr: capture.stderr_text().trim().to_string(),
                });
            }

            let basename = basename_of(file);
            let outcome = verify::check(&capture.stderr_text(), std::slice::from_ref(&basename));
            if !outcome.is_verified() {
                return Err(JobError::TransferVerification {
                    files: vec![file.display().to_string()],
                });
            }
            log::debug!("retrieved {}", file.display());
        }

        // transcripts can lie; the files themselves are the last word
        let missing = missing_paths(files);
        if !missing.is_empty() {
            return Err(JobError::MissingFiles {
                stage: FileStage::Output,
                paths: missing,
            });
        }
        Ok(())
    }
}

fn missing_paths(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter(|p| !p.exists())
        .map(|p| p.display().to_string())
        .collect()
}

fn local_target(file: &Path) -> String {
    match file.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.display().to_string(),
        None => ".".to_string(),
    }
}

fn basename_of(file: &Path) -> String {
    match file.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => file.display().to_string(),
    }
}
