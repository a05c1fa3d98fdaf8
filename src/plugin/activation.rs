//! Keeps the `plugins=(...)` assignment in a zsh resource file in sync with
//! the installed plugins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tempfile::NamedTempFile;

static PLUGINS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>\s*)plugins=\((?P<rest>.*)$").expect("valid plugins regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub contents: String,
    /// Names that were not listed before, in the order they were added.
    pub added: Vec<String>,
}

/// `plugins=(a b c)`
pub fn render_line(names: &[String]) -> String {
    format!("plugins=({})", names.join(" "))
}

/// Existing names first, then the missing ones; every name once.
pub fn merge_names(existing: &[String], names: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + names.len());
    for name in existing.iter().chain(names) {
        if !merged.contains(name) {
            merged.push(name.clone());
        }
    }
    merged
}

/// Rewrite `contents` so its first active `plugins=(...)` assignment lists
/// `names`. A multi-line assignment is collapsed onto one line. Without any
/// assignment, one is appended starting with `base`.
pub fn update_contents(contents: &str, names: &[String], base: &[String]) -> Result<Activation> {
    let eol = if contents.contains("\r\n") { "\r\n" } else { "\n" };
    let lines: Vec<&str> = contents.lines().collect();

    let Some((start, caps)) = lines
        .iter()
        .enumerate()
        .find_map(|(idx, line)| PLUGINS_RE.captures(line).map(|caps| (idx, caps)))
    else {
        let merged = merge_names(base, names);
        let added = names_missing_from(base, &merged);

        let mut updated = contents.to_string();
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push_str(eol);
        }
        updated.push_str(&render_line(&merged));
        updated.push_str(eol);

        return Ok(Activation {
            contents: updated,
            added,
        });
    };

    let indent = caps.name("indent").map_or("", |m| m.as_str());
    let mut existing = Vec::new();
    let mut trailing = String::new();
    let mut end = None;

    let mut body = caps.name("rest").map_or("", |m| m.as_str());
    for (idx, line) in lines.iter().enumerate().skip(start) {
        if idx > start {
            body = *line;
        }

        // A `)` inside a trailing comment does not close the list.
        let code = &body[..body.find('#').unwrap_or(body.len())];
        let (inside, after) = match code.find(')') {
            Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
            None => (code, None),
        };
        existing.extend(inside.split_whitespace().map(str::to_string));

        if let Some(after) = after {
            trailing = after.to_string();
            end = Some(idx);
            break;
        }
    }

    let Some(end) = end else {
        bail!("unterminated plugins=( assignment on line {}", start + 1);
    };

    let merged = merge_names(&existing, names);
    let added = names_missing_from(&existing, &merged);
    let replacement = format!("{indent}{}{trailing}", render_line(&merged));

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    out.extend(lines[..start].iter().map(|line| line.to_string()));
    out.push(replacement);
    out.extend(lines[end + 1..].iter().map(|line| line.to_string()));

    let mut updated = out.join(eol);
    if contents.ends_with('\n') {
        updated.push_str(eol);
    }

    Ok(Activation {
        contents: updated,
        added,
    })
}

/// Update the resource file in place. The file is only written when the
/// assignment actually changes; a missing file is created.
pub fn activate(rc_path: &Path, names: &[String], base: &[String]) -> Result<Vec<String>> {
    let contents = if rc_path.exists() {
        fs::read_to_string(rc_path).with_context(|| format!("reading {}", rc_path.display()))?
    } else {
        String::new()
    };

    let activation = update_contents(&contents, names, base)
        .with_context(|| format!("updating {}", rc_path.display()))?;

    if activation.contents != contents {
        write_replacing(rc_path, &activation.contents)
            .with_context(|| format!("writing {}", rc_path.display()))?;
        tracing::info!(
            "updated {} (added: {})",
            rc_path.display(),
            activation.added.join(", ")
        );
    } else {
        tracing::info!("{} already up to date", rc_path.display());
    }

    Ok(activation.added)
}

/// Write through a sibling temp file renamed over the target, so an
/// interrupted run never leaves a truncated file. Symlinks are followed and
/// existing permissions kept.
fn write_replacing(path: &Path, contents: &str) -> Result<()> {
    let target = if path.exists() {
        fs::canonicalize(path)?
    } else {
        path.to_path_buf()
    };
    let parent = match target.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(&target) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }
    tmp.persist(&target).map_err(|err| err.error)?;
    Ok(())
}

fn names_missing_from(existing: &[String], merged: &[String]) -> Vec<String> {
    merged
        .iter()
        .filter(|name| !existing.contains(name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn plugins_line(contents: &str) -> &str {
        contents
            .lines()
            .find(|line| line.trim_start().starts_with("plugins=("))
            .unwrap()
    }

    #[test]
    fn adds_new_names_after_existing_ones() {
        let rc = "export ZSH=\"$HOME/.oh-my-zsh\"\nplugins=(git)\nsource $ZSH/oh-my-zsh.sh\n";
        let update = update_contents(rc, &names(&["zsh-autosuggestions", "fzf"]), &[]).unwrap();

        assert_eq!(
            update.contents,
            "export ZSH=\"$HOME/.oh-my-zsh\"\nplugins=(git zsh-autosuggestions fzf)\nsource $ZSH/oh-my-zsh.sh\n"
        );
        assert_eq!(update.added, names(&["zsh-autosuggestions", "fzf"]));
    }

    #[test]
    fn every_name_appears_exactly_once() {
        let rc = "plugins=(git fzf git)\n";
        let update = update_contents(rc, &names(&["fzf", "zsh-vi-mode", "zsh-vi-mode"]), &[]).unwrap();

        assert_eq!(plugins_line(&update.contents), "plugins=(git fzf zsh-vi-mode)");
        assert_eq!(update.added, names(&["zsh-vi-mode"]));
    }

    #[test]
    fn already_listed_names_leave_contents_untouched() {
        let rc = "plugins=(git fzf)\n";
        let update = update_contents(rc, &names(&["fzf"]), &[]).unwrap();
        assert_eq!(update.contents, rc);
        assert!(update.added.is_empty());
    }

    #[test]
    fn commented_assignments_are_ignored() {
        let rc = "# plugins=(rails ruby)\n  plugins=(git) # mine\n";
        let update = update_contents(rc, &names(&["fzf"]), &[]).unwrap();
        assert_eq!(update.contents, "# plugins=(rails ruby)\n  plugins=(git fzf) # mine\n");
    }

    #[test]
    fn multi_line_assignment_is_collapsed() {
        let rc = "plugins=(\n  git # vcs\n  docker\n)\nalias ll='ls -l'";
        let update = update_contents(rc, &names(&["fzf"]), &[]).unwrap();
        assert_eq!(update.contents, "plugins=(git docker fzf)\nalias ll='ls -l'");
    }

    #[test]
    fn parenthesis_in_comment_does_not_close_the_list() {
        let rc = "plugins=(\n  git # vcs (core)\n  docker\n)\nsource x\n";
        let update = update_contents(rc, &names(&["fzf"]), &[]).unwrap();
        assert_eq!(update.contents, "plugins=(git docker fzf)\nsource x\n");
    }

    #[test]
    fn crlf_line_endings_are_preserved() {
        let rc = "export A=1\r\nplugins=(git)\r\nsource x\r\n";
        let update = update_contents(rc, &names(&["fzf"]), &[]).unwrap();
        assert_eq!(update.contents, "export A=1\r\nplugins=(git fzf)\r\nsource x\r\n");

        let update = update_contents("export A=1\r\n", &names(&["fzf"]), &[]).unwrap();
        assert_eq!(update.contents, "export A=1\r\nplugins=(fzf)\r\n");
    }

    #[test]
    fn missing_assignment_is_appended_with_base() {
        let rc = "export EDITOR=vim";
        let update = update_contents(rc, &names(&["fzf"]), &names(&["git"])).unwrap();
        assert_eq!(update.contents, "export EDITOR=vim\nplugins=(git fzf)\n");
        assert_eq!(update.added, names(&["fzf"]));
    }

    #[test]
    fn unterminated_assignment_is_an_error() {
        let rc = "plugins=(git\nfzf\n";
        assert!(update_contents(rc, &names(&["fzf"]), &[]).is_err());
    }

    #[test]
    fn activate_writes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".zshrc");
        fs::write(&rc, "plugins=(git)\n").unwrap();
        let wanted = names(&["zsh-syntax-highlighting", "zsh-autosuggestions", "zsh-vi-mode", "fzf"]);

        let added = activate(&rc, &wanted, &[]).unwrap();
        assert_eq!(added, wanted);
        assert_eq!(
            fs::read_to_string(&rc).unwrap(),
            "plugins=(git zsh-syntax-highlighting zsh-autosuggestions zsh-vi-mode fzf)\n"
        );

        let added = activate(&rc, &wanted, &[]).unwrap();
        assert!(added.is_empty());
    }

    #[test]
    fn activate_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join("nested/.zshrc");

        activate(&rc, &names(&["fzf"]), &names(&["git"])).unwrap();
        assert_eq!(fs::read_to_string(&rc).unwrap(), "plugins=(git fzf)\n");
    }

    #[cfg(unix)]
    #[test]
    fn activate_keeps_permissions_and_symlinks() {
        use std::os::unix::fs::{PermissionsExt, symlink};

        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("dotfiles/zshrc");
        fs::create_dir_all(real.parent().unwrap()).unwrap();
        fs::write(&real, "plugins=(git)\n").unwrap();
        fs::set_permissions(&real, fs::Permissions::from_mode(0o644)).unwrap();
        let link = dir.path().join(".zshrc");
        symlink(&real, &link).unwrap();

        activate(&link, &names(&["fzf"]), &[]).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "plugins=(git fzf)\n");
        let mode = fs::metadata(&real).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        let leftovers = fs::read_dir(real.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn render_line_joins_with_spaces() {
        assert_eq!(render_line(&names(&["git", "fzf"])), "plugins=(git fzf)");
        assert_eq!(render_line(&[]), "plugins=()");
    }
}
