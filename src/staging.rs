//! Transient, append-only mirror of the input stream.
//!
//! Every input chunk the demuxer absorbs is also appended to a scratch file in a temp
//! location. The file is never read back: the ingest window stays the parser's only source of
//! bytes. It exists so an operator can inspect exactly what a session received, and it is
//! removed when the session's resources are released.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error};

use crate::opts::StagingOpts;
use crate::{Error, Result};

pub struct StagingFile {
    opts: StagingOpts,
    file: Option<NamedTempFile>,
    bytes_written: u64,
}

impl StagingFile {
    pub fn new(opts: StagingOpts) -> Self {
        Self {
            opts,
            file: None,
            bytes_written: 0,
        }
    }

    /// Path of the scratch file, once it has been created.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append `bytes`, creating the file on first use.
    ///
    /// Failing to create the file is a resource error. A failed write is logged and otherwise
    /// ignored, since nothing downstream depends on the mirror.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.opts.enabled || bytes.is_empty() {
            return Ok(());
        }

        let file = self.ensure_file()?;
        if let Err(err) = file.write_all(bytes) {
            error!(error = %err, path = %file.path().display(), "error writing to staging file");
            return Ok(());
        }
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Delete the scratch file, if any.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            debug!(path = %file.path().display(), bytes = self.bytes_written, "removing staging file");
            if let Err(err) = file.close() {
                error!(error = %err, "error removing staging file");
            }
        }
        self.bytes_written = 0;
    }

    fn ensure_file(&mut self) -> Result<&mut NamedTempFile> {
        if self.file.is_none() {
            let dir: PathBuf = self.opts.dir.clone().unwrap_or_else(std::env::temp_dir);
            let file = tempfile::Builder::new()
                .prefix(&self.opts.prefix)
                .tempfile_in(&dir)
                .map_err(|e| {
                    error!(error = %e, dir = %dir.display(), "error creating staging file");
                    Error::resources(format!("staging file in '{}': {e}", dir.display()))
                })?;
            debug!(path = %file.path().display(), "created staging file");
            self.file = Some(file);
        }

        self.file
            .as_mut()
            .ok_or_else(|| Error::resources("staging file unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_in(dir: &Path) -> StagingOpts {
        StagingOpts {
            enabled: true,
            dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn appends_mirror_input_in_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut staging = StagingFile::new(opts_in(dir.path()));
        assert!(staging.path().is_none());

        staging.append(b"ftyp")?;
        staging.append(b"moov")?;
        let path = staging.path().expect("file created on first append").to_path_buf();
        assert_eq!(std::fs::read(&path)?, b"ftypmoov");
        assert_eq!(staging.bytes_written(), 8);

        staging.close();
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn disabled_staging_never_touches_disk() -> anyhow::Result<()> {
        let mut staging = StagingFile::new(StagingOpts {
            enabled: false,
            ..Default::default()
        });
        staging.append(b"data")?;
        assert!(staging.path().is_none());
        Ok(())
    }

    #[test]
    fn missing_directory_is_a_resource_error() {
        let mut staging = StagingFile::new(StagingOpts {
            enabled: true,
            dir: Some(PathBuf::from("/nonexistent/mp4demux/staging")),
            ..Default::default()
        });
        let err = staging.append(b"data").unwrap_err();
        assert!(matches!(err, Error::InsufficientResources(_)));
    }
}
