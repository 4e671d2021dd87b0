//! Git working copies for configuration backups. Writes to one repository
//! are serialised with a named lock held across the whole
//! write/commit/push sequence; different repositories proceed unrestricted.

use crate::EngineError;
use git2::{Cred, IndexAddOption, PushOptions, RemoteCallbacks, Repository, Signature};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

static REPO_LOCKS: Lazy<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>> =
    Lazy::new(|| StdMutex::new(HashMap::new()));

fn lock_for(path: &Path) -> Arc<AsyncMutex<()>> {
    let key = path.to_string_lossy().to_string();
    let mut locks = REPO_LOCKS.lock().expect("repo lock map");
    locks.entry(key).or_default().clone()
}

#[derive(Clone)]
pub struct BackupRepo {
    path: PathBuf,
    branch: String,
    author_name: String,
    author_email: String,
    /// (username, token) for HTTPS pushes; None pushes with default
    /// credentials or skips when the repo has no remote.
    token: Option<(String, String)>,
}

impl BackupRepo {
    pub fn new(
        path: impl Into<PathBuf>,
        branch: impl Into<String>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            branch: branch.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, username: String, token: String) -> Self {
        self.token = Some((username, token));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a rendered file into the working copy. Callers hold no lock for
    /// plain writes; the commit step snapshots whatever has been written.
    pub async fn write_file(&self, relative: &str, content: &str) -> Result<PathBuf, EngineError> {
        let target = self.path.join(relative.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        Ok(target)
    }

    /// Stage everything, commit when the tree changed, push when a remote
    /// exists. Returns false when there was nothing to commit.
    pub async fn commit_and_push(&self, message: String) -> Result<bool, EngineError> {
        let lock = lock_for(&self.path);
        let _guard = lock.lock().await;

        let repo = self.clone();
        tokio::task::spawn_blocking(move || repo.commit_and_push_blocking(&message))
            .await
            .map_err(|err| EngineError::Validation(format!("git task join: {err}")))?
    }

    fn commit_and_push_blocking(&self, message: &str) -> Result<bool, EngineError> {
        let repo = Repository::open(&self.path)?;
        let mut index = repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.resolve().ok())
            .and_then(|resolved| resolved.peel_to_commit().ok());

        if let Some(parent) = &parent {
            if parent.tree_id() == tree_id {
                return Ok(false);
            }
        }

        let signature = Signature::now(&self.author_name, &self.author_email)?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(repo = %self.path.display(), "committed backup changes");

        match repo.find_remote("origin") {
            Ok(mut remote) => {
                let mut callbacks = RemoteCallbacks::new();
                if let Some((username, token)) = self.token.clone() {
                    callbacks.credentials(move |_url, _user, _allowed| {
                        Cred::userpass_plaintext(&username, &token)
                    });
                }
                let mut options = PushOptions::new();
                options.remote_callbacks(callbacks);
                let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);
                remote.push(&[refspec.as_str()], Some(&mut options))?;
                info!(repo = %self.path.display(), branch = self.branch.as_str(), "pushed");
            }
            Err(_) => {
                warn!(repo = %self.path.display(), "no origin remote, push skipped");
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo(dir: &TempDir) -> BackupRepo {
        Repository::init(dir.path()).expect("init repo");
        BackupRepo::new(dir.path(), "main", "cockpit", "cockpit@example.net")
    }

    #[tokio::test]
    async fn commit_only_when_the_tree_changes() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);

        repo.write_file("configs/r1.cfg", "hostname r1\n").await.unwrap();
        assert!(repo.commit_and_push("backup run 1".into()).await.unwrap());

        // Same content again: nothing to commit.
        repo.write_file("configs/r1.cfg", "hostname r1\n").await.unwrap();
        assert!(!repo.commit_and_push("backup run 2".into()).await.unwrap());

        repo.write_file("configs/r2.cfg", "hostname r2\n").await.unwrap();
        assert!(repo.commit_and_push("backup run 3".into()).await.unwrap());

        let git_repo = Repository::open(dir.path()).unwrap();
        let head = git_repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message(), Some("backup run 3"));
        assert_eq!(head.parent_count(), 1);
    }

    #[tokio::test]
    async fn nested_paths_are_created() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        let path = repo
            .write_file("site/Berlin/edge-r1.cfg", "hostname edge-r1\n")
            .await
            .unwrap();
        assert!(path.exists());
        assert!(repo.commit_and_push("initial".into()).await.unwrap());
    }
}
