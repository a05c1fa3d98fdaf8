use serde::Deserialize;
use std::path::{Path, PathBuf};

/// A plugin as authored in config: where it comes from and what to run
/// after the first clone.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PluginSpec {
    /// Directory name under the custom plugins dir; defaults to the repo slug.
    #[serde(default)]
    pub name: String,
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
    /// Shell commands run in order inside the fresh clone.
    #[serde(default)]
    pub install: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the name belongs in the plugins=() line.
    #[serde(default = "default_true")]
    pub activate: bool,
}

impl PluginSpec {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo: repo.into(),
            branch: None,
            install: Vec::new(),
            enabled: true,
            activate: true,
        }
    }

    #[cfg(test)]
    pub fn with_install(mut self, step: impl Into<String>) -> Self {
        self.install.push(step.into());
        self
    }

    pub fn target_dir(&self, plugins_dir: &Path) -> PathBuf {
        plugins_dir.join(&self.name)
    }
}

fn default_true() -> bool {
    true
}

pub fn repo_slug(repo: &str) -> String {
    let trimmed = repo.trim_end_matches('/').trim_end_matches(".git");
    trimmed
        .rsplit(['/', ':'])
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("plugin")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_slug_strips_git_suffix_and_slashes() {
        assert_eq!(
            repo_slug("https://github.com/zsh-users/zsh-autosuggestions.git"),
            "zsh-autosuggestions"
        );
        assert_eq!(repo_slug("https://github.com/jeffreytse/zsh-vi-mode/"), "zsh-vi-mode");
        assert_eq!(repo_slug("git@github.com:junegunn/fzf.git"), "fzf");
        assert_eq!(repo_slug("git@host:fzf.git"), "fzf");
        assert_eq!(repo_slug(""), "plugin");
    }

    #[test]
    fn spec_fields_default_when_omitted() {
        let spec: PluginSpec =
            toml::from_str("repo = \"https://github.com/junegunn/fzf.git\"").unwrap();
        assert!(spec.name.is_empty());
        assert!(spec.install.is_empty());
        assert!(spec.branch.is_none());
        assert!(spec.enabled && spec.activate);
    }

    #[test]
    fn target_dir_is_name_under_plugins_dir() {
        let spec = PluginSpec::new("fzf", "https://github.com/junegunn/fzf.git");
        assert_eq!(
            spec.target_dir(Path::new("/p")),
            PathBuf::from("/p/fzf")
        );
    }
}
