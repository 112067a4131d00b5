use std::path::{Path, PathBuf};

use crate::error::DashError;
use crate::ports::{validate_bead_id, ArchiveReader};

/// Reads archived bead text from `<dir>/<id>/summary.md` and
/// `<dir>/<id>/worklog.md`.
///
/// Every id passes path-safety validation before it becomes a path
/// component; an invalid id is a distinct error kind from a missing file.
pub struct FsArchiveReader {
    dir: PathBuf,
}

impl FsArchiveReader {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn read_entry(&self, id: &str, file: &str) -> Result<String, DashError> {
        validate_bead_id(id)?;
        let path = self.dir.join(id).join(file);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DashError::NotFound(format!("{}/{}", id, file)))
            }
            Err(e) => Err(DashError::Io(e)),
        }
    }
}

impl ArchiveReader for FsArchiveReader {
    fn read_summary(&self, id: &str) -> Result<String, DashError> {
        self.read_entry(id, "summary.md")
    }

    fn read_worklog(&self, id: &str) -> Result<String, DashError> {
        self.read_entry(id, "worklog.md")
    }
}
