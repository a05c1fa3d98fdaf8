use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::manifest::PluginSpec;
use crate::plugin::runner::{CommandRunner, Invocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    Cloned,
    AlreadyPresent,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub name: String,
    pub dir: PathBuf,
    pub status: InstallStatus,
    /// Install steps that failed after a successful clone.
    pub warnings: Vec<String>,
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        !matches!(self.status, InstallStatus::Failed(_))
    }
}

#[derive(Debug, Default)]
pub struct InstallReport {
    pub outcomes: Vec<InstallOutcome>,
}

impl InstallReport {
    pub fn cloned(&self) -> usize {
        self.count(|status| matches!(status, InstallStatus::Cloned))
    }

    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, InstallStatus::AlreadyPresent))
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_installed())
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.warnings.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&InstallStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| pred(&outcome.status))
            .count()
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("cannot create plugins directory {}: {source}", path.display())]
    PluginsDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Clones plugins into the custom plugins directory, one at a time.
pub struct PluginInstaller<R> {
    runner: R,
    plugins_dir: PathBuf,
}

impl<R: CommandRunner> PluginInstaller<R> {
    pub fn new(runner: R, plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            plugins_dir: plugins_dir.into(),
        }
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Install every plugin in order. Only an unusable plugins directory
    /// aborts the run; per-plugin failures land in the report.
    pub fn install_all<'a>(
        &mut self,
        plugins: impl IntoIterator<Item = &'a PluginSpec>,
    ) -> Result<InstallReport, InstallError> {
        fs::create_dir_all(&self.plugins_dir).map_err(|source| InstallError::PluginsDir {
            path: self.plugins_dir.clone(),
            source,
        })?;

        let mut report = InstallReport::default();
        for plugin in plugins {
            report.outcomes.push(self.install(plugin));
        }

        tracing::info!(
            "install finished: {} cloned, {} present, {} failed",
            report.cloned(),
            report.skipped(),
            report.failed()
        );

        Ok(report)
    }

    pub fn install(&mut self, plugin: &PluginSpec) -> InstallOutcome {
        let dir = plugin.target_dir(&self.plugins_dir);
        let mut outcome = InstallOutcome {
            name: plugin.name.clone(),
            dir: dir.clone(),
            status: InstallStatus::Cloned,
            warnings: Vec::new(),
        };

        // A dangling symlink still occupies the name; leave it alone.
        if dir.exists() || dir.is_symlink() {
            tracing::info!("{}: already present at {}", plugin.name, dir.display());
            outcome.status = InstallStatus::AlreadyPresent;
            return outcome;
        }

        tracing::info!("{}: cloning {}", plugin.name, plugin.repo);
        let clone = Invocation::git_clone(&plugin.repo, &dir, plugin.branch.as_deref());
        if let Err(err) = self.runner.run(&clone) {
            tracing::error!("{}: clone failed: {}", plugin.name, err.detail());
            outcome.status = InstallStatus::Failed(err.detail());
            return outcome;
        }

        if !dir.is_dir() {
            let err = format!("clone finished but {} is missing", dir.display());
            tracing::error!("{}: {err}", plugin.name);
            outcome.status = InstallStatus::Failed(err);
            return outcome;
        }

        for step in &plugin.install {
            tracing::info!("{}: running `{step}`", plugin.name);
            if let Err(err) = self.runner.run(&Invocation::shell(step, &dir)) {
                tracing::warn!("{}: install step failed: {}", plugin.name, err.detail());
                outcome.warnings.push(err.detail());
                break;
            }
        }

        outcome
    }
}
