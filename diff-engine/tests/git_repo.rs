//! End-to-end diff collection against a real throwaway git repository.

use std::path::Path;
use std::process::Command;

use diff_engine::{DiffMode, DiffOptions, collect_diff_context};
use rule_engine::RuleContextLevel;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .expect("git runs");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.name", "test"]);
    git(dir, &["config", "user.email", "test@example.com"]);
}

/// S1: a single-line comment change yields one diff-only unit with the
/// comment tag, high rule confidence and exact line numbers.
#[tokio::test]
async fn staged_comment_change_produces_diff_only_unit() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());

    let original = "\
def f():
    return 1


def g():
    return 2


def h():
    return 3

# old note
value = 4
";
    std::fs::write(dir.path().join("foo.py"), original).unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial"]);

    let updated = original.replace("# old note", "# new note");
    std::fs::write(dir.path().join("foo.py"), updated).unwrap();
    git(dir.path(), &["add", "."]);

    let ctx = collect_diff_context(&DiffOptions::default(), dir.path())
        .await
        .unwrap();
    // Auto resolves to staged (index is dirty, tree is clean).
    assert_eq!(ctx.mode, DiffMode::Staged);
    assert_eq!(ctx.units.len(), 1);

    let unit = &ctx.units[0];
    assert_eq!(unit.file_path, "foo.py");
    assert!(unit.has_tag("only_comments"));
    assert_eq!(unit.rule_context_level, Some(RuleContextLevel::DiffOnly));
    assert!(unit.rule_confidence.unwrap() >= 0.88);
    assert_eq!(unit.line_numbers.new, vec![12]);
    assert_eq!(unit.line_numbers.new_compact, "L12");

    assert_eq!(ctx.review_index.summary.files_changed, vec!["foo.py"]);
    assert_eq!(ctx.review_index.review_metadata.total_changes, 1);
}

/// Working-tree changes are picked up once the index is clean, and commit
/// ranges diff via the merge base.
#[tokio::test]
async fn working_and_commit_modes_resolve() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());

    std::fs::write(dir.path().join("app.py"), "x = 1\ny = 2\n").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "one"]);

    std::fs::write(dir.path().join("app.py"), "x = 1\ny = 3\n").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "two"]);

    // Unstaged edit → working mode under auto.
    std::fs::write(dir.path().join("app.py"), "x = 1\ny = 4\n").unwrap();
    let ctx = collect_diff_context(&DiffOptions::default(), dir.path())
        .await
        .unwrap();
    assert_eq!(ctx.mode, DiffMode::Working);

    // Commit range HEAD~1..HEAD sees the second commit's change.
    git(dir.path(), &["checkout", "-q", "--", "app.py"]);
    let opts = DiffOptions {
        mode: DiffMode::Commit,
        commit_from: Some("HEAD~1".to_string()),
        ..DiffOptions::default()
    };
    // "HEAD~1" fails the safe-ref whitelist (`~` is not allowed), so the
    // caller must resolve it first.
    assert!(collect_diff_context(&opts, dir.path()).await.is_err());

    let head_parent = Command::new("git")
        .args(["rev-parse", "HEAD~1"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    let parent_sha = String::from_utf8_lossy(&head_parent.stdout).trim().to_string();
    let opts = DiffOptions {
        mode: DiffMode::Commit,
        commit_from: Some(parent_sha),
        ..DiffOptions::default()
    };
    let ctx = collect_diff_context(&opts, dir.path()).await.unwrap();
    assert_eq!(ctx.mode, DiffMode::Commit);
    assert_eq!(ctx.units.len(), 1);
    assert!(ctx.units[0].unified_diff.contains("+y = 3"));
}

/// No changes anywhere is an input error, not a silent empty run.
#[tokio::test]
async fn clean_tree_is_an_error() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    std::fs::write(dir.path().join("a.py"), "pass\n").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "init"]);

    assert!(
        collect_diff_context(&DiffOptions::default(), dir.path())
            .await
            .is_err()
    );
}
