use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugin::manifest::{PluginSpec, repo_slug};

const DEFAULT_PLUGINS_SUBDIR: &str = ".oh-my-zsh/custom/plugins";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub plugins_dir: String,
    pub rc_file: String,
    #[serde(default)]
    pub base_plugins: Vec<String>,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let user_path = directories::ProjectDirs::from("", "", "omz-plugins")
            .map(|d| d.config_dir().join("config.toml"));
        Self::load_from(user_path.as_deref())
    }

    pub fn load_from(user_path: Option<&Path>) -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut merged: toml::Value =
            toml::from_str(defaults).context("parsing built-in default config")?;

        if let Some(path) = user_path.filter(|p| p.exists()) {
            let user_str = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let user: toml::Value = toml::from_str(&user_str)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_values(&mut merged, user);
            tracing::info!("loaded user config from {}", path.display());
        }

        let mut config = merged.try_into::<AppConfig>().context("invalid configuration")?;
        config.normalize()?;
        Ok(config)
    }

    /// Resolve the Oh My Zsh custom plugins directory.
    pub fn plugins_dir(&self) -> Result<PathBuf> {
        resolve_plugins_dir(
            &self.general.plugins_dir,
            std::env::var("ZSH_CUSTOM").ok(),
            dirs_home(),
        )
    }

    pub fn rc_path(&self) -> Result<PathBuf> {
        let home = dirs_home();
        if self.general.rc_file.starts_with('~') && home.is_none() {
            return Err(anyhow!("cannot determine home directory"));
        }
        Ok(expand_tilde(&self.general.rc_file, home.as_deref()))
    }

    #[cfg(test)]
    pub fn plugin(&self, name: &str) -> Option<&PluginSpec> {
        self.plugins.iter().find(|plugin| plugin.name == name)
    }

    fn normalize(&mut self) -> Result<()> {
        let mut seen = HashSet::new();

        for plugin in &mut self.plugins {
            if plugin.repo.trim().is_empty() {
                bail!("plugin {:?} has no repo", plugin.name);
            }

            if plugin.name.trim().is_empty() {
                plugin.name = repo_slug(&plugin.repo);
            }

            let name = plugin.name.as_str();
            if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
                bail!("plugin name {name:?} is not a valid directory name");
            }

            // Each name is one word of the plugins=() line.
            if name.chars().any(|c| c.is_whitespace() || matches!(c, '#' | '(' | ')')) {
                bail!("plugin name {name:?} cannot appear in a plugins=() line");
            }

            if !seen.insert(name.to_string()) {
                bail!("plugin {name:?} is configured more than once");
            }
        }

        Ok(())
    }
}

/// Tables merge key by key; every other value (arrays included) is replaced.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn resolve_plugins_dir(
    configured: &str,
    zsh_custom: Option<String>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    let configured = configured.trim();
    if !configured.is_empty() {
        if configured.starts_with('~') && home.is_none() {
            return Err(anyhow!("cannot determine home directory"));
        }
        return Ok(expand_tilde(configured, home.as_deref()));
    }

    if let Some(custom) = zsh_custom.filter(|value| !value.trim().is_empty()) {
        return Ok(expand_tilde(custom.trim(), home.as_deref()).join("plugins"));
    }

    home.map(|home| home.join(DEFAULT_PLUGINS_SUBDIR))
        .ok_or_else(|| anyhow!("cannot determine home directory"))
}

pub fn expand_tilde(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
