use std::fs;
use std::path::{Path, PathBuf};

use super::model::{Job, JobId};
use crate::error::{FinchError, Result};

/// One JSON document per job inside a directory.
pub(crate) struct JobFiles {
    dir: PathBuf,
}

impl JobFiles {
    pub(crate) fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| unavailable(&dir, e))?;
        Ok(Self { dir })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Writes the job through a temporary file so readers never see a partial document.
    pub(crate) fn write(&self, job: &Job) -> Result<()> {
        let path = self.path_of(&job.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(job)?;
        fs::write(&tmp, body).map_err(|e| unavailable(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| unavailable(&path, e))?;
        Ok(())
    }

    /// Reads every stored job. Unreadable documents are skipped.
    pub(crate) fn load_all(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| unavailable(&self.dir, e))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path)
                .map_err(FinchError::from)
                .and_then(|bytes| serde_json::from_slice::<Job>(&bytes).map_err(FinchError::from))
            {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable job record");
                }
            }
        }
        Ok(jobs)
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> FinchError {
    FinchError::StoreUnavailable(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Inputs;

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let files = JobFiles::open(dir.path().join("jobs")).unwrap();
        let job = Job::new("add", Inputs::new().with("a", 1i64));
        files.write(&job).unwrap();

        let loaded = files.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, job.id);
        assert!(!files.dir().join(format!("{}.json.tmp", job.id)).exists());
    }

    #[test]
    fn corrupt_documents_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let files = JobFiles::open(dir.path()).unwrap();
        fs::write(dir.path().join("garbage.json"), b"{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        files.write(&Job::new("add", Inputs::new())).unwrap();

        assert_eq!(files.load_all().unwrap().len(), 1);
    }

    #[test]
    fn write_to_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let files = JobFiles::open(dir.path().join("jobs")).unwrap();
        fs::remove_dir_all(dir.path().join("jobs")).unwrap();

        let err = files.write(&Job::new("add", Inputs::new())).unwrap_err();
        assert!(matches!(err, FinchError::StoreUnavailable(_)));
    }
}
