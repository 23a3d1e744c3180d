use crate::config::SessionConfig;
use crate::exec::CommandLine;

/// Builds the fully-qualified command lines that tunnel remote work through
/// the configured relay. Pure function of the session configuration; owns no
/// state of its own.
pub struct RelaySession<'a> {
    config: &'a SessionConfig,
}

impl<'a> RelaySession<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self { config }
    }

    fn base(&self) -> CommandLine {
        let mut env: Vec<(String, String)> = self
            .config
            .env_vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.sort();

        let mut args = Vec::new();
        if self.config.relay_verbose {
            args.push("-v".to_string());
        }

        CommandLine {
            program: self.config.relay_command.clone(),
            args,
            env,
        }
    }

    /// `<relay> [-v] ssh <host> <remote command...>`
    pub fn ssh<I>(&self, remote: I) -> CommandLine
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut cmd = self.base();
        cmd.args.push("ssh".to_string());
        cmd.args.push(self.config.hostname.clone());
        cmd.args.extend(remote.into_iter().map(Into::into));
        cmd
    }

    /// `<relay> [-v] <copytool> -v <copy args...>`
    ///
    /// The copy tool always runs with `-v`: the transfer transcript has to
    /// land on stderr for verification to have anything to read.
    pub fn copy<I>(&self, copy_args: I) -> CommandLine
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut cmd = self.base();
        cmd.args.push(self.config.copy_tool.command().to_string());
        cmd.args.push("-v".to_string());
        cmd.args.extend(copy_args.into_iter().map(Into::into));
        cmd
    }
}
