//! Git primitives consumed by the mirror store and the staleness oracle.
//!
//! All remote and local version-control work goes through the
//! [`GitOperations`] trait so it can be replaced in tests. The default
//! implementation shells out to the system `git` binary, which picks up SSH
//! keys, credential helpers and anything else configured in `~/.gitconfig`.

use std::path::Path;
use std::process::Command;

use url::Url;

use crate::error::{Error, Result};

/// Trait for git operations - allows mocking in tests
pub trait GitOperations: Send + Sync {
    /// Clones `url` into `target_dir`, which must not exist or be empty.
    fn clone_repository(&self, url: &str, target_dir: &Path) -> Result<()>;

    /// Fetches all refs from `origin` without touching the working tree.
    fn fetch(&self, repo_dir: &Path) -> Result<()>;

    /// Fast-forwards the checked-out branch to its upstream.
    fn pull(&self, repo_dir: &Path) -> Result<()>;

    /// Checks out `revision` in the working copy, detaching HEAD if needed.
    fn checkout(&self, repo_dir: &Path, revision: &str) -> Result<()>;

    /// Returns the hash of the most recent local history entry, if any.
    fn local_head(&self, repo_dir: &Path) -> Result<Option<String>>;

    /// Returns the hash the remote's HEAD points to, or `None` for an empty
    /// remote.
    fn remote_head(&self, url: &str) -> Result<Option<String>>;

    /// Resolves the name of the remote's default branch.
    fn default_branch(&self, url: &str) -> Result<String>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command to perform real Git operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultGitOperations;

impl GitOperations for DefaultGitOperations {
    fn clone_repository(&self, url: &str, target_dir: &Path) -> Result<()> {
        let target = target_dir.to_string_lossy();
        run_git(None, &["clone", "--quiet", url, &target], url)?;
        Ok(())
    }

    fn fetch(&self, repo_dir: &Path) -> Result<()> {
        run_git(Some(repo_dir), &["fetch", "--quiet", "origin"], &location(repo_dir))?;
        Ok(())
    }

    fn pull(&self, repo_dir: &Path) -> Result<()> {
        run_git(Some(repo_dir), &["pull", "--quiet", "--ff-only"], &location(repo_dir))?;
        Ok(())
    }

    fn checkout(&self, repo_dir: &Path, revision: &str) -> Result<()> {
        run_git(
            Some(repo_dir),
            &["checkout", "--quiet", "--force", revision],
            &location(repo_dir),
        )?;
        Ok(())
    }

    fn local_head(&self, repo_dir: &Path) -> Result<Option<String>> {
        let stdout = run_git(Some(repo_dir), &["log", "-1", "--format=%H"], &location(repo_dir))?;
        let hash = stdout.trim();
        Ok((!hash.is_empty()).then(|| hash.to_string()))
    }

    fn remote_head(&self, url: &str) -> Result<Option<String>> {
        let stdout = run_git(None, &["ls-remote", url, "HEAD"], url)?;
        Ok(parse_remote_head(&stdout))
    }

    fn default_branch(&self, url: &str) -> Result<String> {
        let stdout = run_git(None, &["ls-remote", "--symref", url, "HEAD"], url)?;
        parse_symref_branch(&stdout).ok_or_else(|| Error::GitCommand {
            command: "ls-remote --symref".to_string(),
            location: url.to_string(),
            stderr: "remote HEAD does not point to a branch".to_string(),
        })
    }
}

fn location(repo_dir: &Path) -> String {
    repo_dir.display().to_string()
}

/// Runs `git` with `args`, optionally inside `repo_dir`, returning stdout.
fn run_git(repo_dir: Option<&Path>, args: &[&str], location: &str) -> Result<String> {
    let mut command = Command::new("git");
    if let Some(dir) = repo_dir {
        command.arg("-C").arg(dir);
    }
    // Never block on an interactive credential prompt.
    command.env("GIT_TERMINAL_PROMPT", "0");

    let output = command.args(args).output().map_err(|e| Error::GitCommand {
        command: args.join(" "),
        location: location.to_string(),
        stderr: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::GitCommand {
            command: args.join(" "),
            location: location.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extracts the HEAD hash from `git ls-remote <url> HEAD` output.
pub fn parse_remote_head(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        // Git ls-remote output format: <hash>\t<ref>
        let mut parts = line.split('\t');
        match (parts.next(), parts.next()) {
            (Some(hash), Some("HEAD")) if !hash.is_empty() => Some(hash.to_string()),
            _ => None,
        }
    })
}

/// Extracts the branch name from `git ls-remote --symref <url> HEAD` output.
pub fn parse_symref_branch(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        // Symref lines look like: ref: refs/heads/main\tHEAD
        let target = line.strip_prefix("ref: ")?.split('\t').next()?;
        target.strip_prefix("refs/heads/").map(|b| b.to_string())
    })
}

/// Builds the raw-content URL of `manifest.json` at `revision`.
///
/// The `.git` suffix is stripped from the repository address and its host is
/// replaced with `raw_host`, so `https://github.com/org/repo.git` at `main`
/// becomes `https://raw.githubusercontent.com/org/repo/main/manifest.json`.
pub fn raw_manifest_url(address: &str, raw_host: &str, revision: &str) -> Result<Url> {
    let mut url = Url::parse(address)?;
    url.set_host(Some(raw_host))?;
    url.set_port(None).map_err(|_| Error::Network {
        url: address.to_string(),
        message: "address cannot carry a port".to_string(),
    })?;

    let path = url.path().trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let path = format!("{}/{}/manifest.json", path, revision);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
