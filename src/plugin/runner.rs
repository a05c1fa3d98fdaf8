use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// A single external command: program, arguments, working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shallow clone; never prompts for credentials.
    pub fn git_clone(repo: &str, dest: &Path, branch: Option<&str>) -> Self {
        let mut invocation = Self::new("git")
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .env("GIT_TERMINAL_PROMPT", "0");

        if let Some(branch) = branch {
            invocation = invocation.arg("--branch").arg(branch);
        }

        invocation
            .arg(repo)
            .arg(dest.to_string_lossy().into_owned())
    }

    pub fn shell(script: &str, cwd: &Path) -> Self {
        Self::new("sh").arg("-c").arg(script).current_dir(cwd)
    }

    pub fn is_git_clone(&self) -> bool {
        self.program == "git" && self.args.first().is_some_and(|arg| arg == "clone")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `sh -c <script>` reads better as just the script.
        if self.program == "sh" && self.args.len() == 2 && self.args[0] == "-c" {
            return f.write_str(&self.args[1]);
        }

        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("could not start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed with {}", exit_description(*code))]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl CommandError {
    /// Full report: headline plus captured output, if any.
    pub fn detail(&self) -> String {
        let mut text = self.to_string();

        if let CommandError::Failed { stdout, stderr, .. } = self {
            if !stdout.is_empty() {
                text.push_str(&format!("\nStdout:\n{stdout}"));
            }
            if !stderr.is_empty() {
                text.push_str(&format!("\nStderr:\n{stderr}"));
            }
        }

        text
    }
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Seam between the installer and the outside world.
pub trait CommandRunner {
    /// Runs to completion and returns trimmed stdout.
    fn run(&mut self, invocation: &Invocation) -> Result<String, CommandError>;
}

#[derive(Debug)]
pub struct SystemRunner<W = io::Stdout> {
    /// Where successful command output is echoed; `None` keeps it quiet.
    echo: Option<W>,
}

impl SystemRunner {
    pub fn new(echo: bool) -> Self {
        Self {
            echo: echo.then(io::stdout),
        }
    }
}

impl<W: Write> SystemRunner<W> {
    #[cfg(test)]
    pub fn with_echo(writer: W) -> Self {
        Self { echo: Some(writer) }
    }

    #[cfg(test)]
    pub fn into_echo(self) -> Option<W> {
        self.echo
    }
}

impl<W: Write> CommandRunner for SystemRunner<W> {
    fn run(&mut self, invocation: &Invocation) -> Result<String, CommandError> {
        let command_line = invocation.to_string();
        tracing::debug!("running `{command_line}`");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(cwd) = invocation.cwd.as_ref() {
            command.current_dir(cwd);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let output = command.output().map_err(|source| CommandError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command_line,
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        if !stdout.is_empty() {
            tracing::debug!("`{command_line}` stdout:\n{stdout}");
            if let Some(out) = self.echo.as_mut() {
                if let Err(err) = writeln!(out, "{stdout}") {
                    tracing::warn!("could not echo output of `{command_line}`: {err}");
                }
            }
        }

        Ok(stdout)
    }
}
