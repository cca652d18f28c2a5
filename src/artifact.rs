//! Staging of file outputs.
//!
//! Handlers write files into their working directory; the engine hands each
//! declared file output to an [`ArtifactStore`], which publishes it and
//! returns the location recorded on the job.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FinchError, Result};
use crate::job::JobId;

pub trait ArtifactStore: Send + Sync {
    /// Publishes `source` as output `name` of `job_id` and returns its location.
    fn stage(&self, job_id: &JobId, name: &str, source: &Path) -> Result<String>;
}

/// Copies artifacts under `root/<job_id>/`.
///
/// Locations are `file://` URLs unless a base output URL is configured, in
/// which case they are `<base>/<job_id>/<file>`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    base_url: Option<String>,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn stage(&self, job_id: &JobId, name: &str, source: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(FinchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("output '{name}' file {} does not exist", source.display()),
            )));
        }
        let file_name = source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());

        let dir = self.root.join(job_id.to_string());
        fs::create_dir_all(&dir)?;
        let dest = dir.join(&file_name);
        fs::copy(source, &dest)?;

        let location = match &self.base_url {
            Some(base) => format!("{}/{job_id}/{file_name}", base.trim_end_matches('/')),
            None => format!("file://{}", fs::canonicalize(&dest)?.display()),
        };
        tracing::debug!(job_id = %job_id, output = name, %location, "Staged output");
        Ok(location)
    }
}
