// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use crate::error::JobError;
use crate::exec::ExecLimits;

const DEFAULT_RELAY_COMMAND: &str = "sup";

/// Remote-copy tool used for transfers. Only scp today; keeping this closed
/// means an unsupported tool cannot be configured at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyTool {
    #[default]
    Scp,
}

impl CopyTool {
    pub fn command(&self) -> &'static str {
        match self {
            CopyTool::Scp => "scp",
        }
    }
}

/// Everything needed to reach the cluster for one job. Immutable for the
/// lifetime of that job.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host the relay tunnels into, also the domain suffix of job handles.
    pub hostname: String,
    pub username: Option<String>,
    /// Remote directory files are staged to and the job runs from.
    pub working_directory: String,
    pub relay_command: String,
    pub copy_tool: CopyTool,
    /// Pass `-v` to the relay itself.
    pub relay_verbose: bool,
    /// Path, on the remote side, of the scheduler submission file.
    pub qsub_filepath: String,
    /// Extra options for qsub, overriding directives in the submission file.
    pub qsub_options: String,
    /// Environment applied to every spawned relay process.
    pub env_vars: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            username: None,
            working_directory: String::new(),
            relay_command: DEFAULT_RELAY_COMMAND.to_string(),
            copy_tool: CopyTool::default(),
            relay_verbose: false,
            qsub_filepath: String::new(),
            qsub_options: String::new(),
            env_vars: HashMap::new(),
        }
    }
}

impl SessionConfig {
    pub(crate) fn required_options(&self) -> [(&'static str, &str); 3] {
        [
            ("working_directory", self.working_directory.as_str()),
            ("hostname", self.hostname.as_str()),
            ("qsub_filepath", self.qsub_filepath.as_str()),
        ]
    }

    /// Check the options no job can run without. Called before any remote
    /// action so a bad configuration never spawns a process.
    pub fn validate(&self) -> Result<(), JobError> {
        for (option, value) in self.required_options() {
            if value.is_empty() {
                return Err(JobError::Configuration { option });
            }
        }
        Ok(())
    }

    /// The `[user@]host:workdir` target the copy tool writes to.
    pub fn remote_destination(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => format!("{user}@{}:{}", self.hostname, self.working_directory),
            None => format!("{}:{}", self.hostname, self.working_directory),
        }
    }
}

/// Files to stage before submission and to retrieve after completion.
/// Either list may be empty.
#[derive(Debug, Clone, Default)]
pub struct TransferSpec {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

/// Job-completion budget: how often to ask the scheduler and how long to
/// wait overall. Zero timeout means an unbounded wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingPolicy {
    pub poll_interval: Duration,
    pub completion_timeout: Duration,
}

/// One job's full configuration as loaded from a file.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub session: SessionConfig,
    pub transfer: TransferSpec,
    pub polling: PollingPolicy,
    pub limits: ExecLimits,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    hostname: Option<String>,
    username: Option<String>,
    working_directory: Option<String>,
    relay_command: Option<String>,
    copy_tool: Option<CopyTool>,
    relay_verbose: Option<bool>,
    qsub_filepath: Option<String>,
    qsub_options: Option<String>,
    env_vars: Option<HashMap<String, String>>,
    input_files: Option<Vec<String>>,
    output_files: Option<Vec<String>>,
    poll_interval_secs: Option<f64>,
    completion_timeout_secs: Option<f64>,
    exec_poll_delay_secs: Option<f64>,
    exec_timeout_secs: Option<f64>,
}

/// Caller-supplied values that win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub qsub_options: Option<String>,
    pub poll_interval: Option<Duration>,
    pub completion_timeout: Option<Duration>,
}

pub fn load(path: &Path, overrides: Overrides) -> Result<JobConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let file: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    let session = SessionConfig {
        hostname: file.hostname.unwrap_or_default(),
        username: file.username.filter(|u| !u.is_empty()),
        working_directory: file.working_directory.unwrap_or_default(),
        relay_command: file
            .relay_command
            .unwrap_or_else(|| DEFAULT_RELAY_COMMAND.to_string()),
        copy_tool: file.copy_tool.unwrap_or_default(),
        relay_verbose: file.relay_verbose.unwrap_or(false),
        qsub_filepath: file.qsub_filepath.unwrap_or_default(),
        qsub_options: overrides
            .qsub_options
            .or(file.qsub_options)
            .unwrap_or_default(),
        env_vars: file.env_vars.unwrap_or_default(),
    };

    let transfer = TransferSpec {
        inputs: expand_paths(file.input_files.unwrap_or_default()),
        outputs: expand_paths(file.output_files.unwrap_or_default()),
    };

    let poll_interval = match overrides.poll_interval {
        Some(value) => value,
        None => duration_field("poll_interval_secs", file.poll_interval_secs)?,
    };
    let completion_timeout = match overrides.completion_timeout {
        Some(value) => value,
        None => duration_field("completion_timeout_secs", file.completion_timeout_secs)?,
    };

    let limits = ExecLimits {
        poll_delay: duration_field("exec_poll_delay_secs", file.exec_poll_delay_secs)?,
        timeout: duration_field("exec_timeout_secs", file.exec_timeout_secs)?,
    };

    Ok(JobConfig {
        session,
        transfer,
        polling: PollingPolicy {
            poll_interval,
            completion_timeout,
        },
        limits,
    })
}

fn duration_field(name: &str, value: Option<f64>) -> Result<Duration> {
    match value {
        None => Ok(Duration::ZERO),
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        Some(secs) => anyhow::bail!("{name} must be a non-negative number of seconds, got {secs}"),
    }
}

fn expand_paths(raw: Vec<String>) -> Vec<PathBuf> {
    raw.iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("job.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_full_config_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
hostname = "pfe20"
username = "hschilli"
working_directory = "/nobackup/run1"
relay_verbose = true
copy_tool = "scp"
qsub_filepath = "job.pbs"
qsub_options = "-q devel"
input_files = ["nas_input.txt"]
output_files = ["nas_output.txt"]
poll_interval_secs = 2.5
completion_timeout_secs = 600
exec_timeout_secs = 30
[env_vars]
GROUP = "a1607"
"#,
        );

        let config = load(&path, Overrides::default()).unwrap();
        assert_eq!(config.session.hostname, "pfe20");
        assert_eq!(config.session.username.as_deref(), Some("hschilli"));
        assert_eq!(config.session.relay_command, "sup");
        assert!(config.session.relay_verbose);
        assert_eq!(config.session.copy_tool, CopyTool::Scp);
        assert_eq!(config.session.qsub_options, "-q devel");
        assert_eq!(config.session.env_vars.get("GROUP").unwrap(), "a1607");
        assert_eq!(config.transfer.inputs, vec![PathBuf::from("nas_input.txt")]);
        assert_eq!(config.polling.poll_interval, Duration::from_secs_f64(2.5));
        assert_eq!(config.polling.completion_timeout, Duration::from_secs(600));
        assert_eq!(config.limits.poll_delay, Duration::ZERO);
        assert_eq!(config.limits.timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_take_precedence_over_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "hostname = \"pfe20\"\nqsub_options = \"-q devel\"\npoll_interval_secs = 10\n",
        );

        let config = load(
            &path,
            Overrides {
                qsub_options: Some("-q long".to_string()),
                poll_interval: Some(Duration::from_secs(1)),
                completion_timeout: None,
            },
        )
        .unwrap();

        assert_eq!(config.session.qsub_options, "-q long");
        assert_eq!(config.polling.poll_interval, Duration::from_secs(1));
        assert_eq!(config.polling.completion_timeout, Duration::ZERO);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "poll_interval_secs = -1\n");
        let err = load(&path, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn unknown_copy_tool_is_rejected_at_parse_time() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "copy_tool = \"bbscp\"\n");
        assert!(load(&path, Overrides::default()).is_err());
    }

    #[test]
    fn validate_reports_first_empty_required_option() {
        let config = SessionConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            JobError::Configuration {
                option: "working_directory"
            }
        ));

        let config = SessionConfig {
            working_directory: "/nobackup/run1".to_string(),
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, JobError::Configuration { option: "hostname" }));
    }

    #[test]
    fn remote_destination_includes_username_when_set() {
        let config = SessionConfig {
            hostname: "pfe20".to_string(),
            working_directory: "/nobackup/run1".to_string(),
            username: Some("hschilli".to_string()),
            ..SessionConfig::default()
        };
        assert_eq!(config.remote_destination(), "hschilli@pfe20:/nobackup/run1");

        let config = SessionConfig {
            username: Some(String::new()),
            ..config
        };
        assert_eq!(config.remote_destination(), "pfe20:/nobackup/run1");
    }
}
