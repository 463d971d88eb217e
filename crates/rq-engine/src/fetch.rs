//! Working-copy acquisition.
//!
//! Repositories are shallow-cloned through the `git` CLI into a per-repo
//! directory under the configured work root. The same mechanism backs the
//! agent's file-reader tool, which clones on demand, reads one file, and
//! removes the clone again.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rq_core::{RepoId, Result};
use tracing::info;

/// Resolves a repo id to a clone URL (credentials included).
///
/// Implemented at the application layer over the data-source registry and
/// the secret store.
#[async_trait]
pub trait CloneUrlProvider: Send + Sync + 'static {
    async fn clone_url(&self, repo_id: RepoId) -> Result<String>;
}

/// Build an HTTPS clone URL for `owner/name`, splicing in an access token
/// when one is available.
pub fn build_clone_url(repo_full_name: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => format!("https://{token}@github.com/{repo_full_name}.git"),
        None => format!("https://github.com/{repo_full_name}.git"),
    }
}

/// Strip userinfo from a URL so credentials never reach logs or errors.
fn sanitize_url(url: &str) -> String {
    match (url.find("://"), url.find('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}{}", &url[..scheme_end + 3], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

/// Shallow-clone `clone_url` into `dest`, replacing any existing directory.
pub async fn clone_repo(clone_url: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        tokio::fs::remove_dir_all(dest).await?;
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!(url = %sanitize_url(clone_url), dest = %dest.display(), "cloning repository");

    let output = tokio::process::Command::new("git")
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg(clone_url)
        .arg(dest)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.replace(clone_url, &sanitize_url(clone_url));
        return Err(rq_core::Error::Git(format!("git clone failed: {}", stderr.trim())));
    }

    Ok(())
}

/// Remove a working copy, tolerating its absence.
pub async fn remove_workdir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reads one file from a repository.
#[async_trait]
pub trait FileReader: Send + Sync + 'static {
    async fn read_file(&self, repo_id: RepoId, file_path: &str) -> Result<String>;
}

/// File reader that clones the repository on demand.
pub struct GitFileReader {
    work_root: PathBuf,
    urls: std::sync::Arc<dyn CloneUrlProvider>,
}

impl GitFileReader {
    pub fn new(work_root: PathBuf, urls: std::sync::Arc<dyn CloneUrlProvider>) -> Self {
        Self { work_root, urls }
    }
}

#[async_trait]
impl FileReader for GitFileReader {
    async fn read_file(&self, repo_id: RepoId, file_path: &str) -> Result<String> {
        // Relative paths only; a path that escapes the clone is an error,
        // not a read elsewhere on disk.
        let relative = Path::new(file_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(rq_core::Error::MissingInput(format!(
                "invalid file path: {file_path}"
            )));
        }

        let clone_url = self.urls.clone_url(repo_id).await?;
        let dest = self.work_root.join("reads").join(repo_id.to_string());

        clone_repo(&clone_url, &dest).await?;
        let result = async {
            let full = dest.join(relative);
            if !full.exists() {
                return Err(rq_core::Error::NotFound(format!(
                    "file '{file_path}' not found in repository"
                )));
            }
            Ok(tokio::fs::read_to_string(&full).await?)
        }
        .await;

        remove_workdir(&dest).await?;
        result
    }
}
