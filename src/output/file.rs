use anyhow::{Context, Result};
use std::fs::{File, create_dir_all};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::output::OutputTracker;

/// Writes all output to one destination file.
///
/// Each shard of a parallel run stages into its own temporary file, created
/// next to the destination unless a staging directory is given. Merging copies
/// the temporary file onto the end of the destination and deletes it.
pub struct FileOutputTracker {
    path: PathBuf,
    staging_dir: PathBuf,
    destination: Mutex<BufWriter<File>>,
}

impl FileOutputTracker {
    /// Create (or truncate) the destination at `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// If the parent directories or the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let staging_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        };
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            staging_dir,
            destination: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Stage shard output under `dir` instead of next to the destination.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.destination.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct DestinationWriter<'a> {
    tracker: &'a FileOutputTracker,
}

impl Write for DestinationWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tracker.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tracker.lock().flush()
    }
}

impl OutputTracker for FileOutputTracker {
    type Staged = BufWriter<NamedTempFile>;

    fn direct(&self) -> Result<Box<dyn Write + '_>> {
        Ok(Box::new(DestinationWriter { tracker: self }))
    }

    fn stage(&self) -> Result<BufWriter<NamedTempFile>> {
        let temp = tempfile::Builder::new()
            .prefix(".shardwalk-stage-")
            .tempfile_in(&self.staging_dir)
            .with_context(|| format!("create staging file in {}", self.staging_dir.display()))?;
        Ok(BufWriter::new(temp))
    }

    fn merge(&self, staged: BufWriter<NamedTempFile>) -> Result<()> {
        let mut temp = staged.into_inner().map_err(io::IntoInnerError::into_error)?;
        let file = temp.as_file_mut();
        file.seek(SeekFrom::Start(0))?;
        let copied = io::copy(file, &mut *self.lock())?;
        debug!(bytes = copied, path = %temp.path().display(), "staged output appended");
        temp.close()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.lock()
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))
    }
}
