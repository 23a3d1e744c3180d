// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::time::Duration;
use thiserror::Error as ThisError;

use crate::exec::ExecError;

/// Which side of the job a file list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Input,
    Output,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStage::Input => write!(f, "input"),
            FileStage::Output => write!(f, "output"),
        }
    }
}

/// Everything that can go wrong while driving one job through the relay.
///
/// None of these are retried; each message carries enough detail to
/// reproduce the failing command by hand.
#[derive(Debug, ThisError)]
pub enum JobError {
    #[error("the option '{option}' cannot be empty")]
    Configuration { option: &'static str },

    #[error("the following {stage} files are missing: {}", .paths.join(", "))]
    MissingFiles {
        stage: FileStage,
        paths: Vec<String>,
    },

    #[error("copy command exited with status {code}: {stderr}")]
    CopyFailed { code: i32, stderr: String },

    #[error("transfer could not be verified for: {}", .files.join(", "))]
    TransferVerification { files: Vec<String> },

    #[error("no job handle found in submission output; command used: {command}")]
    Submission { command: String },

    #[error("unable to determine status of job {job_id}")]
    StatusUnknown { job_id: String },

    #[error("job did not finish within {timeout:?}")]
    CompletionTimeout { timeout: Duration },

    #[error(transparent)]
    Exec(#[from] ExecError),
}
