//! Local repository history for dependency-confusion analysis
//!
//! Reads the git repository containing a package directory: first-commit
//! date, recent activity, author concentration, branch count, and a
//! commit-message anomaly heuristic.

use std::collections::HashMap;
use std::path::Path;

use jiff::Timestamp;

use crate::core::error::Result;

/// Commits inspected for the message-anomaly heuristic.
const MESSAGE_SAMPLE: usize = 50;
const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

/// Snapshot of a repository's activity.
#[derive(Debug, Clone, Default)]
pub struct RepoActivity {
    pub first_commit: Option<Timestamp>,
    pub commits_last_year: usize,
    /// Share of last-year commits by the most active author, in [0, 1].
    pub dominant_author_share: f64,
    pub branch_count: usize,
    /// Share of sampled commit messages that look like filler
    /// ("update", "fix", single words), in [0, 1].
    pub trivial_message_ratio: f64,
}

/// Inspect the repository containing `package_path`.
///
/// A missing or empty repository is not an error: analysis proceeds with
/// an empty activity snapshot and the timeline features stay unknown.
pub fn read_repo_activity(package_path: &Path) -> Result<RepoActivity> {
    let repo = match git2::Repository::discover(package_path) {
        Ok(repo) => repo,
        Err(err) => {
            tracing::debug!(
                path = %package_path.display(),
                error = %err,
                "no repository found for package"
            );
            return Ok(RepoActivity::default());
        }
    };

    let mut activity = RepoActivity {
        branch_count: count_branches(&repo),
        ..RepoActivity::default()
    };

    let mut revwalk = match repo.revwalk() {
        Ok(walk) => walk,
        Err(_) => return Ok(activity),
    };
    if revwalk.push_head().is_err() {
        // Unborn HEAD: repository exists but has no commits yet.
        return Ok(activity);
    }
    let _ = revwalk.set_sorting(git2::Sort::TIME);

    let now = Timestamp::now().as_second();
    let year_ago = now - SECONDS_PER_YEAR;

    let mut first_commit_secs: Option<i64> = None;
    let mut authors: HashMap<String, usize> = HashMap::new();
    let mut sampled_messages = 0usize;
    let mut trivial_messages = 0usize;

    for oid in revwalk.flatten() {
        let Ok(commit) = repo.find_commit(oid) else {
            continue;
        };
        let when = commit.time().seconds();
        first_commit_secs = Some(match first_commit_secs {
            Some(existing) => existing.min(when),
            None => when,
        });

        if when >= year_ago {
            activity.commits_last_year += 1;
            let author = commit
                .author()
                .email()
                .unwrap_or("unknown")
                .to_string();
            *authors.entry(author).or_insert(0) += 1;
        }

        if sampled_messages < MESSAGE_SAMPLE {
            sampled_messages += 1;
            if is_trivial_message(commit.summary().unwrap_or("")) {
                trivial_messages += 1;
            }
        }
    }

    activity.first_commit = first_commit_secs.and_then(|secs| Timestamp::from_second(secs).ok());
    if activity.commits_last_year > 0 {
        let dominant = authors.values().copied().max().unwrap_or(0);
        activity.dominant_author_share = dominant as f64 / activity.commits_last_year as f64;
    }
    if sampled_messages > 0 {
        activity.trivial_message_ratio = trivial_messages as f64 / sampled_messages as f64;
    }

    Ok(activity)
}

fn count_branches(repo: &git2::Repository) -> usize {
    repo.branches(Some(git2::BranchType::Local))
        .map(|branches| branches.count())
        .unwrap_or(0)
}

fn is_trivial_message(summary: &str) -> bool {
    let trimmed = summary.trim();
    if trimmed.len() < 10 {
        return true;
    }
    matches!(
        trimmed.to_lowercase().as_str(),
        "update" | "updates" | "fix" | "fixes" | "wip" | "changes" | "minor changes" | "commit"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .expect("git available in test environment");
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn test_missing_repo_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let activity = read_repo_activity(dir.path()).unwrap();
        assert!(activity.first_commit.is_none());
        assert_eq!(activity.commits_last_year, 0);
    }

    #[test]
    fn test_repo_with_commits() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q", "-b", "main"]);
        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "add initial module layout"]);
        std::fs::write(dir.path().join("b.txt"), "two").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "fix"]);

        let activity = read_repo_activity(dir.path()).unwrap();
        assert!(activity.first_commit.is_some());
        assert_eq!(activity.commits_last_year, 2);
        assert_eq!(activity.dominant_author_share, 1.0);
        assert!(activity.branch_count >= 1);
        // One of the two sampled messages is filler.
        assert!((activity.trivial_message_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_repo_has_no_first_commit() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        let activity = read_repo_activity(dir.path()).unwrap();
        assert!(activity.first_commit.is_none());
    }

    #[test]
    fn test_trivial_message_heuristic() {
        assert!(is_trivial_message("fix"));
        assert!(is_trivial_message("wip"));
        assert!(is_trivial_message(""));
        assert!(!is_trivial_message("introduce sliding-window limiter"));
    }
}
