//! Git surface of the pipeline.
//!
//! Only plumbing commands are used (`rev-parse`, `diff`, `show`, `ls-files`,
//! `merge-base`, `log`, `branch`, `rev-list`). Every subprocess is bounded
//! by `GIT_COMMAND_TIMEOUT` (default 60 s) and refs/paths that reach
//! `git show` are whitelisted against injection and traversal.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::process::Command;
use tracing::debug;

use services::record_fallback;

use crate::errors::{DiffResult, GitError};

const DEFAULT_GIT_TIMEOUT_SECS: u64 = 60;

fn git_timeout() -> Duration {
    let secs = std::env::var("GIT_COMMAND_TIMEOUT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_GIT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Supported diff modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    Working,
    Staged,
    Pr,
    Commit,
    Auto,
}

impl DiffMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffMode::Working => "working",
            DiffMode::Staged => "staged",
            DiffMode::Pr => "pr",
            DiffMode::Commit => "commit",
            DiffMode::Auto => "auto",
        }
    }
}

/// Run one git command and return stdout, lossily decoded.
pub async fn run_git(args: &[&str], cwd: &Path) -> DiffResult<String> {
    let output = run_git_raw(args, cwd).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(GitError::CommandFailed {
            command: args.join(" "),
            stderr,
        }
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run git without failing on non-zero exit; used for status probes where
/// the exit code is the answer.
async fn run_git_raw(args: &[&str], cwd: &Path) -> DiffResult<std::process::Output> {
    let timeout = git_timeout();
    debug!(args = args.join(" "), cwd = %cwd.display(), "git invocation");

    let child = Command::new("git")
        .arg("-c")
        .arg("core.quotepath=false")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(GitError::Launch)?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => Ok(result.map_err(GitError::Launch)?),
        Err(_) => Err(GitError::Timeout {
            command: args.join(" "),
            timeout_secs: timeout.as_secs(),
        }
        .into()),
    }
}

/// Fail fast when the directory is not inside a git work tree.
pub async fn ensure_git_repository(cwd: &Path) -> DiffResult<()> {
    let output = run_git_raw(&["rev-parse", "--is-inside-work-tree"], cwd).await?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(GitError::NotARepository(if stderr.is_empty() {
            cwd.display().to_string()
        } else {
            stderr
        })
        .into())
    }
}

/// True when the working tree has unstaged changes or untracked files.
pub async fn has_working_changes(cwd: &Path) -> DiffResult<bool> {
    let output = run_git_raw(&["diff", "--quiet"], cwd).await?;
    if output.status.code() == Some(1) {
        return Ok(true);
    }
    let status = run_git(&["status", "--porcelain"], cwd).await?;
    Ok(status.lines().any(|line| line.starts_with("??")))
}

/// True when the index holds uncommitted changes.
pub async fn has_staged_changes(cwd: &Path) -> DiffResult<bool> {
    let output = run_git_raw(&["diff", "--cached", "--quiet"], cwd).await?;
    match output.status.code() {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(GitError::CommandFailed {
                command: "diff --cached --quiet".into(),
                stderr,
            }
            .into())
        }
    }
}

/// Prefer `origin`, otherwise the first configured remote.
pub async fn remote_name(cwd: &Path) -> String {
    match run_git(&["remote"], cwd).await {
        Ok(output) => {
            let remotes: Vec<&str> = output.lines().map(str::trim).filter(|r| !r.is_empty()).collect();
            if remotes.contains(&"origin") || remotes.is_empty() {
                "origin".to_string()
            } else {
                remotes[0].to_string()
            }
        }
        Err(_) => "origin".to_string(),
    }
}

/// Find `main`/`master` among local, then remote branches.
pub async fn detect_base_branch(cwd: &Path) -> DiffResult<String> {
    let local = run_git(&["branch", "--list"], cwd).await?;
    let branches: Vec<String> = local
        .lines()
        .map(|line| line.replace('*', "").trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();
    for candidate in ["main", "master"] {
        if branches.iter().any(|b| b == candidate) {
            return Ok(candidate.to_string());
        }
    }

    let remote = run_git(&["branch", "-r"], cwd).await?;
    for candidate in ["main", "master"] {
        if remote
            .lines()
            .map(str::trim)
            .any(|b| b.ends_with(&format!("/{candidate}")))
        {
            return Ok(candidate.to_string());
        }
    }
    Err(GitError::NoBaseBranch.into())
}

/// True when HEAD is ahead of the remote base branch.
pub async fn branch_has_pr_changes(base_branch: &str, cwd: &Path) -> DiffResult<bool> {
    let remote = remote_name(cwd).await;
    let remote_ref = format!("{remote}/{base_branch}");
    if run_git(&["rev-parse", "--verify", &remote_ref], cwd).await.is_err() {
        return Ok(false);
    }
    let counts = run_git(
        &["rev-list", "--left-right", "--count", &format!("{remote_ref}...HEAD")],
        cwd,
    )
    .await?;
    let ahead = counts
        .split_whitespace()
        .nth(1)
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    Ok(ahead > 0)
}

/// Resolve `auto` in priority order: staged > working > PR-ahead-of-base.
pub async fn auto_detect_mode(cwd: &Path) -> DiffResult<DiffMode> {
    if has_staged_changes(cwd).await? {
        return Ok(DiffMode::Staged);
    }
    if has_working_changes(cwd).await? {
        return Ok(DiffMode::Working);
    }
    if let Ok(base) = detect_base_branch(cwd).await {
        if branch_has_pr_changes(&base, cwd).await? {
            return Ok(DiffMode::Pr);
        }
    }
    Err(GitError::NoChanges("auto".into()).into())
}

/// Fetch diff text for the mode; returns the resolved mode and base branch.
/// Rename detection (`-M`) is always on.
pub async fn diff_text(
    mode: DiffMode,
    base_branch: Option<&str>,
    cwd: &Path,
) -> DiffResult<(String, DiffMode, Option<String>)> {
    ensure_git_repository(cwd).await?;
    match mode {
        DiffMode::Auto => {
            let detected = auto_detect_mode(cwd).await?;
            Box::pin(diff_text(detected, base_branch, cwd)).await
        }
        DiffMode::Working => Ok((run_git(&["diff", "-M"], cwd).await?, DiffMode::Working, None)),
        DiffMode::Staged => Ok((
            run_git(&["diff", "--cached", "-M"], cwd).await?,
            DiffMode::Staged,
            None,
        )),
        DiffMode::Pr => {
            let base = match base_branch {
                Some(base) => base.to_string(),
                None => detect_base_branch(cwd).await?,
            };
            let remote = remote_name(cwd).await;
            let remote_ref = format!("{remote}/{base}");
            let base_ref = if run_git(&["rev-parse", "--verify", &remote_ref], cwd).await.is_ok() {
                remote_ref
            } else if run_git(&["rev-parse", "--verify", &base], cwd).await.is_ok() {
                base.clone()
            } else {
                return Err(GitError::CommandFailed {
                    command: format!("rev-parse --verify {base}"),
                    stderr: format!("base branch '{base}' not found locally or in '{remote}'"),
                }
                .into());
            };
            let text = run_git(&["diff", "-M", &format!("{base_ref}...HEAD")], cwd).await?;
            Ok((text, DiffMode::Pr, Some(base)))
        }
        DiffMode::Commit => Err(crate::errors::Error::Validation(
            "commit mode requires commit_diff with an explicit range".into(),
        )),
    }
}

/// Diff for an explicit commit range. With `use_merge_base` the left
/// endpoint is `merge-base(from, to)` so only the changes introduced by the
/// branch show up; without a common ancestor it falls back to a direct diff.
pub async fn commit_diff(
    commit_from: &str,
    commit_to: Option<&str>,
    use_merge_base: bool,
    cwd: &Path,
) -> DiffResult<String> {
    ensure_git_repository(cwd).await?;
    if !is_safe_ref(commit_from) {
        return Err(GitError::UnsafeArgument(commit_from.to_string()).into());
    }
    let commit_to = commit_to.unwrap_or("HEAD");
    if commit_to != "HEAD" && !is_safe_ref(commit_to) {
        return Err(GitError::UnsafeArgument(commit_to.to_string()).into());
    }

    run_git(&["rev-parse", "--verify", commit_from], cwd).await?;
    if commit_to != "HEAD" {
        run_git(&["rev-parse", "--verify", commit_to], cwd).await?;
    }

    if use_merge_base {
        if let Ok(merge_base) = run_git(&["merge-base", commit_from, commit_to], cwd).await {
            let merge_base = merge_base.trim().to_string();
            return run_git(&["diff", "-M", &merge_base, commit_to], cwd).await;
        }
    }
    run_git(&["diff", "-M", commit_from, commit_to], cwd).await
}

/// Previous version of a file at `base`, as lines. Unsafe refs/paths and
/// git failures degrade to an empty vec with a fallback record; the bundle
/// simply omits the previous version.
pub async fn show_file(base: &str, file_path: &str, cwd: &Path) -> Vec<String> {
    if !is_safe_ref(base) || !is_safe_path(file_path) {
        record_fallback(
            "git_show_rejected",
            "skip git show due to unsafe ref/path",
            Some(json!({ "base": base, "file_path": file_path })),
        );
        return Vec::new();
    }
    match run_git(&["show", &format!("{base}:{file_path}")], cwd).await {
        Ok(output) => output.lines().map(str::to_string).collect(),
        Err(err) => {
            record_fallback(
                "git_show_failed",
                "git show failed, previous version omitted",
                Some(json!({ "base": base, "file_path": file_path, "error": err.to_string() })),
            );
            Vec::new()
        }
    }
}

/// Refs must be plain `[A-Za-z0-9._-]+` with no `..` range syntax.
pub fn is_safe_ref(reference: &str) -> bool {
    !reference.is_empty()
        && !reference.contains("..")
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !reference.starts_with('-')
}

/// Paths must be relative, traversal-free and single-line.
pub fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && !Path::new(path).is_absolute()
        && !path.contains("..")
        && !path.contains('\n')
        && !path.contains('\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_whitelist_rejects_injection() {
        assert!(is_safe_ref("main"));
        assert!(is_safe_ref("v1.2.3"));
        assert!(is_safe_ref("feature_branch-2"));
        assert!(!is_safe_ref("main..HEAD"));
        assert!(!is_safe_ref("--upload-pack=evil"));
        assert!(!is_safe_ref("origin/main"));
        assert!(!is_safe_ref("/abs"));
        assert!(!is_safe_ref("branch name"));
    }

    #[test]
    fn path_whitelist_rejects_traversal() {
        assert!(is_safe_path("src/lib.rs"));
        assert!(!is_safe_path("../etc/passwd"));
        assert!(!is_safe_path("/etc/passwd"));
        assert!(!is_safe_path("a\nb"));
    }

    #[tokio::test]
    async fn show_file_rejects_unsafe_ref_quietly() {
        let lines = show_file("bad..ref", "src/lib.rs", Path::new(".")).await;
        assert!(lines.is_empty());
    }
}
