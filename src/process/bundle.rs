//! Packing of several handler files into one zip archive.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::handler::{HandlerContext, HandlerError};

/// Progress at which bundling starts unless the handler says otherwise.
pub const DEFAULT_ZIP_START: u8 = 90;

impl HandlerContext {
    /// Zips `files` into `archive` inside the working directory.
    ///
    /// Entries are named after their file name. Each file is logged as
    /// `Zipping file i of n`, with progress stepped from `start_percent`
    /// towards 100. Relative paths resolve against the working directory.
    pub async fn zip_files(
        &self,
        archive: &str,
        files: &[PathBuf],
        start_percent: u8,
    ) -> Result<PathBuf, HandlerError> {
        let start = start_percent.min(100);
        let path = self.workdir().join(archive);
        let created = path.clone();
        let mut writer = blocking(move || Ok(ZipWriter::new(File::create(&created)?))).await?;

        let total = files.len();
        for (n, file) in files.iter().enumerate() {
            let percent = zip_percent(start, n, total);
            self.log_progress(&format!("Zipping file {} of {total}", n + 1), percent)
                .await?;

            let source = self.workdir().join(file);
            writer = blocking(move || {
                add_entry(&mut writer, &source)?;
                Ok(writer)
            })
            .await?;
        }

        blocking(move || {
            writer.finish()?;
            Ok(())
        })
        .await?;
        tracing::debug!(job_id = %self.job_id(), archive = %path.display(), files = total, "Bundled outputs");
        Ok(path)
    }
}

fn zip_percent(start: u8, n: usize, total: usize) -> u8 {
    if total == 0 {
        return start;
    }
    let span = usize::from(100 - start);
    start + u8::try_from(n * span / total).unwrap_or(0)
}

fn add_entry(writer: &mut ZipWriter<File>, source: &Path) -> zip::result::ZipResult<()> {
    let name = source
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", source.display()),
            )
        })?;
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    writer.start_file(name, options)?;
    io::copy(&mut File::open(source)?, writer)?;
    Ok(())
}

/// Runs zip work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, HandlerError>
where
    F: FnOnce() -> zip::result::ZipResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HandlerError::Other(anyhow::Error::new(e).context("zip archive"))),
        Err(e) => Err(HandlerError::failed(format!("zip task failed: {e}"))),
    }
}
