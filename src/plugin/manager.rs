use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::model::config::AppConfig;
use crate::plugin::activation;
use crate::plugin::installer::{InstallOutcome, InstallReport, InstallStatus, PluginInstaller};
use crate::plugin::manifest::PluginSpec;
use crate::plugin::runner::CommandRunner;

#[derive(Debug)]
pub struct PluginManager {
    plugins: Vec<PluginSpec>,
    plugins_dir: PathBuf,
    base_plugins: Vec<String>,
}

impl PluginManager {
    pub fn new(config: &AppConfig, plugins_dir: PathBuf) -> Self {
        Self {
            plugins: config
                .plugins
                .iter()
                .filter(|plugin| plugin.enabled)
                .cloned()
                .collect(),
            plugins_dir,
            base_plugins: config.general.base_plugins.clone(),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Enabled plugins, narrowed to `names` when any are given.
    pub fn select(&self, names: &[String]) -> Result<Vec<&PluginSpec>> {
        if names.is_empty() {
            return Ok(self.plugins.iter().collect());
        }

        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| !self.plugins.iter().any(|plugin| &plugin.name == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            bail!("unknown plugin(s): {}", unknown.join(", "));
        }

        Ok(self
            .plugins
            .iter()
            .filter(|plugin| names.contains(&plugin.name))
            .collect())
    }

    pub fn install<R: CommandRunner>(
        &self,
        runner: R,
        names: &[String],
    ) -> Result<InstallReport> {
        let selected = self.select(names)?;
        let mut installer = PluginInstaller::new(runner, &self.plugins_dir);
        Ok(installer.install_all(selected)?)
    }

    /// Names for the plugins=() line: plugins that want activation and are
    /// present on disk.
    pub fn activation_names(&self) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|plugin| plugin.activate && plugin.target_dir(&self.plugins_dir).is_dir())
            .map(|plugin| plugin.name.clone())
            .collect()
    }

    pub fn activate(&self, rc_path: &Path) -> Result<Vec<String>> {
        activation::activate(rc_path, &self.activation_names(), &self.base_plugins)
    }

    /// The line a user would paste by hand: base plugins plus every
    /// activatable plugin, installed or not.
    pub fn snippet(&self) -> String {
        let names: Vec<String> = self
            .plugins
            .iter()
            .filter(|plugin| plugin.activate)
            .map(|plugin| plugin.name.clone())
            .collect();
        activation::render_line(&activation::merge_names(&self.base_plugins, &names))
    }

    pub fn summary_notification(report: &InstallReport) -> String {
        format!(
            "plugins: {} cloned, {} already present, {} failed, {} warnings",
            report.cloned(),
            report.skipped(),
            report.failed(),
            report.warning_count()
        )
    }

    pub fn outcome_notification(outcome: &InstallOutcome) -> String {
        let status = match &outcome.status {
            InstallStatus::Cloned => "cloned".to_string(),
            InstallStatus::AlreadyPresent => "already present".to_string(),
            InstallStatus::Failed(err) => format!("error: {err}"),
        };
        format!(
            "plugin {} [{status}] ({})",
            outcome.name,
            outcome.dir.display()
        )
    }

    pub fn warning_notifications(outcome: &InstallOutcome) -> Vec<String> {
        outcome
            .warnings
            .iter()
            .map(|warning| format!("plugin {} warning: {warning}", outcome.name))
            .collect()
    }

    pub fn list_notifications(&self) -> Vec<String> {
        if self.plugins.is_empty() {
            return vec!["plugins: none configured".to_string()];
        }

        self.plugins
            .iter()
            .map(|plugin| {
                let dir = plugin.target_dir(&self.plugins_dir);
                let status = if dir.is_dir() { "installed" } else { "missing" };
                format!("plugin {} [{status}] {} ({})", plugin.name, plugin.repo, dir.display())
            })
            .collect()
    }
}
