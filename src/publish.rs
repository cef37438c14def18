//! Pushing the rewritten feed and artifacts to a git remote.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{Config, PublishConfig};
use crate::error::{PublishError, Result};
use crate::tool::{ExternalTool, ToolFailure, ToolOutput};

/// What a publish attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Pushed,

    /// The working tree already matched the last commit
    NothingToCommit,
}

/// Makes finished files available to podcast clients
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `paths`; all changes in the tree when empty.
    async fn publish(&self, paths: &[PathBuf]) -> Result<PublishOutcome>;
}

/// Stages, commits and pushes with the `git` command line
#[derive(Debug, Clone)]
pub struct GitPublisher {
    git: ExternalTool,
    config: PublishConfig,
}

impl GitPublisher {
    pub fn new(git: ExternalTool, config: PublishConfig) -> Self {
        Self { git, config }
    }

    pub fn from_config(config: &Config) -> Self {
        let git = ExternalTool::new(
            &config.tools.git,
            Duration::from_secs(config.publish.timeout_secs),
        );
        Self::new(git, config.publish.clone())
    }

    async fn git(&self, args: &[OsString]) -> std::result::Result<ToolOutput, ToolFailure> {
        self.git.run(Some(self.config.repo_dir.as_path()), args).await
    }

    /// Run a git subcommand whose failure aborts publishing
    async fn step(&self, args: &[OsString]) -> Result<ToolOutput> {
        self.git(args).await.map_err(|failure| self.error(args, failure).into())
    }

    fn error(&self, args: &[OsString], failure: ToolFailure) -> PublishError {
        let command = format!(
            "git {}",
            args.first().map(|a| a.to_string_lossy()).unwrap_or_default()
        );
        match failure {
            ToolFailure::TimedOut => PublishError::TimedOut {
                command,
                seconds: self.git.timeout().as_secs(),
            },
            other => PublishError::CommandFailed {
                command,
                reason: other.to_string(),
            },
        }
    }

    async fn ensure_remote(&self) -> Result<()> {
        let remotes = self.step(&args(["remote"])).await?;
        if remotes.stdout.lines().any(|line| line.trim() == self.config.remote) {
            return Ok(());
        }

        let Some(url) = &self.config.remote_url else {
            return Err(PublishError::CommandFailed {
                command: "git remote".to_string(),
                reason: format!("remote '{}' is not configured", self.config.remote),
            }
            .into());
        };

        info!("Adding git remote {} -> {}", self.config.remote, url);
        self.step(&args(["remote", "add", self.config.remote.as_str(), url.as_str()]))
            .await?;
        Ok(())
    }

    /// Pathspecs for `paths`, relative to the repository
    fn pathspecs(&self, paths: &[PathBuf]) -> Result<Vec<OsString>> {
        let cwd = std::env::current_dir()?;
        paths
            .iter()
            .map(|path| {
                repo_relative(path, &self.config.repo_dir, &cwd)
                    .map(PathBuf::into_os_string)
                    .ok_or_else(|| {
                        PublishError::OutsideRepository {
                            path: path.display().to_string(),
                            repo: self.config.repo_dir.display().to_string(),
                        }
                        .into()
                    })
            })
            .collect()
    }

    /// `git diff --cached --quiet` exits 1 when something is staged
    async fn has_staged_changes(&self) -> Result<bool> {
        let diff = args(["diff", "--cached", "--quiet"]);
        match self.git(&diff).await {
            Ok(_) => Ok(false),
            Err(ToolFailure::Exit { code: Some(1), .. }) => Ok(true),
            Err(failure) => Err(self.error(&diff, failure).into()),
        }
    }
}

/// `path` relative to `repo_dir`, both resolved against `cwd`.
/// `None` when the path lies outside the repository.
fn repo_relative(path: &Path, repo_dir: &Path, cwd: &Path) -> Option<PathBuf> {
    let path = lexical_absolute(path, cwd);
    let repo = lexical_absolute(repo_dir, cwd);

    let relative = path.strip_prefix(&repo).ok()?;
    if relative.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(relative.to_path_buf())
    }
}

fn lexical_absolute(path: &Path, cwd: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in cwd.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    resolved
}

fn args<'a>(parts: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
    parts.into_iter().map(OsString::from).collect()
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, paths: &[PathBuf]) -> Result<PublishOutcome> {
        let pathspecs = self.pathspecs(paths)?;
        self.ensure_remote().await?;

        let mut add = args(["add", "-A"]);
        if !pathspecs.is_empty() {
            add.push(OsString::from("--"));
            add.extend(pathspecs);
        }
        self.step(&add).await?;

        if !self.has_staged_changes().await? {
            info!("Nothing to publish; working tree unchanged");
            return Ok(PublishOutcome::NothingToCommit);
        }

        self.step(&args(["commit", "-m", self.config.commit_message.as_str()]))
            .await?;
        debug!("Committed \"{}\"", self.config.commit_message);

        self.step(&args(["push", "-u", self.config.remote.as_str(), self.config.branch.as_str()]))
            .await?;
        info!("Pushed to {} {}", self.config.remote, self.config.branch);

        Ok(PublishOutcome::Pushed)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::LoudcastError;
    use std::path::Path;
    use tempfile::tempdir;

    /// Stand-in for git that logs its arguments. `diff` exits with
    /// `diff_code`; `push` fails when `fail_push` is set.
    fn fake_git(dir: &Path, remotes: &str, diff_code: i32, fail_push: bool) -> ExternalTool {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("git.log");
        let script = dir.join("fake-git");
        let body = format!(
            "#!/bin/sh\necho \"$*\" >> '{log}'\ncase \"$1\" in\n  remote) [ \"$2\" = add ] || printf '{remotes}' ;;\n  diff) exit {diff_code} ;;\n  push) {push} ;;\nesac\nexit 0\n",
            log = log.display(),
            remotes = remotes,
            diff_code = diff_code,
            push = if fail_push { "echo 'rejected' >&2; exit 1" } else { "true" },
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        ExternalTool::new(script, Duration::from_secs(10))
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("git.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn config(dir: &Path) -> PublishConfig {
        PublishConfig {
            enabled: true,
            repo_dir: dir.to_path_buf(),
            commit_message: "Update feed".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_commits_and_pushes() {
        let dir = tempdir().unwrap();
        let publisher = GitPublisher::new(fake_git(dir.path(), "origin\\n", 1, false), config(dir.path()));

        let outcome = publisher
            .publish(&[dir.path().join("feed.xml"), dir.path().join("output")])
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Pushed);
        assert_eq!(
            calls(dir.path()),
            vec![
                "remote",
                "add -A -- feed.xml output",
                "diff --cached --quiet",
                "commit -m Update feed",
                "push -u origin master",
            ]
        );
    }

    #[tokio::test]
    async fn test_clean_tree_is_not_committed() {
        let dir = tempdir().unwrap();
        let publisher = GitPublisher::new(fake_git(dir.path(), "origin\\n", 0, false), config(dir.path()));

        let outcome = publisher.publish(&[]).await.unwrap();
        assert_eq!(outcome, PublishOutcome::NothingToCommit);
        assert!(!calls(dir.path()).iter().any(|c| c.starts_with("commit")));
    }

    #[tokio::test]
    async fn test_missing_remote_is_added() {
        let dir = tempdir().unwrap();
        let config = PublishConfig {
            remote_url: Some("git@example.com:pod/feed.git".to_string()),
            ..config(dir.path())
        };
        let publisher = GitPublisher::new(fake_git(dir.path(), "", 1, false), config);

        publisher.publish(&[]).await.unwrap();
        assert_eq!(calls(dir.path())[1], "remote add origin git@example.com:pod/feed.git");
    }

    #[tokio::test]
    async fn test_missing_remote_without_url_fails() {
        let dir = tempdir().unwrap();
        let publisher = GitPublisher::new(fake_git(dir.path(), "upstream\\n", 1, false), config(dir.path()));

        let result = publisher.publish(&[]).await;
        assert!(matches!(result, Err(LoudcastError::Publish(PublishError::CommandFailed { .. }))));
    }

    #[tokio::test]
    async fn test_push_failure_is_reported() {
        let dir = tempdir().unwrap();
        let publisher = GitPublisher::new(fake_git(dir.path(), "origin\\n", 1, true), config(dir.path()));

        match publisher.publish(&[]).await {
            Err(LoudcastError::Publish(PublishError::CommandFailed { command, reason })) => {
                assert_eq!(command, "git push");
                assert!(reason.contains("rejected"));
            }
            other => panic!("Expected push failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paths_are_relative_to_repo_dir() {
        let dir = tempdir().unwrap();
        let site = dir.path().join("site");
        std::fs::create_dir_all(&site).unwrap();
        let publisher = GitPublisher::new(fake_git(&site, "origin\\n", 1, false), config(&site));

        publisher
            .publish(&[site.join("feed.xml"), dir.path().join("site/./audio/../output")])
            .await
            .unwrap();

        assert_eq!(calls(&site)[1], "add -A -- feed.xml output");
    }

    #[tokio::test]
    async fn test_path_outside_repo_is_rejected() {
        let dir = tempdir().unwrap();
        let site = dir.path().join("site");
        std::fs::create_dir_all(&site).unwrap();
        let publisher = GitPublisher::new(fake_git(&site, "origin\\n", 1, false), config(&site));

        let result = publisher.publish(&[dir.path().join("feed.xml")]).await;

        assert!(matches!(
            result,
            Err(LoudcastError::Publish(PublishError::OutsideRepository { .. }))
        ));
        assert!(calls(&site).is_empty());
    }

    #[test]
    fn test_repo_relative_resolves_against_cwd() {
        let cwd = Path::new("/work");

        assert_eq!(
            repo_relative(Path::new("site/feed.xml"), Path::new("site"), cwd),
            Some(PathBuf::from("feed.xml"))
        );
        assert_eq!(
            repo_relative(Path::new("./site/output"), Path::new("site/"), cwd),
            Some(PathBuf::from("output"))
        );
        assert_eq!(
            repo_relative(Path::new("/work/site"), Path::new("site"), cwd),
            Some(PathBuf::from("."))
        );
        assert_eq!(
            repo_relative(Path::new("feed.xml"), Path::new("."), cwd),
            Some(PathBuf::from("feed.xml"))
        );
        assert_eq!(repo_relative(Path::new("other/feed.xml"), Path::new("site"), cwd), None);
        assert_eq!(repo_relative(Path::new("site-old/feed.xml"), Path::new("site"), cwd), None);
    }
}
