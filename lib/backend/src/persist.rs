//! Keeping the provider session between runs.

use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fieldcheck_platform_access::ProviderSession;
use tracing::debug;

use crate::error::BackendError;

/// Somewhere the identity provider saves its session.
pub trait SessionPersistence: Send + Sync {
    /// The session saved by an earlier run, if any.
    ///
    /// # Errors
    ///
    /// `BackendError::Persistence` if a saved session exists but cannot be read.
    fn load(&self) -> Result<Option<ProviderSession>, BackendError>;

    /// Saves `session`, or forgets the saved one when given `None`.
    ///
    /// # Errors
    ///
    /// `BackendError::Persistence` if the write fails.
    fn save(&self, session: Option<&ProviderSession>) -> Result<(), BackendError>;
}

/// A session saved as JSON in one file, readable only by its owner.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl Display) -> BackendError {
        BackendError::Persistence {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn write(&self, raw: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(&self.path)?.write_all(raw)
    }
}

impl SessionPersistence for FileSessionStore {
    fn load(&self) -> Result<Option<ProviderSession>, BackendError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        let session = serde_json::from_slice(&raw).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "loaded saved session");
        Ok(Some(session))
    }

    fn save(&self, session: Option<&ProviderSession>) -> Result<(), BackendError> {
        match session {
            Some(session) => {
                let raw = serde_json::to_vec(session).map_err(|e| self.error(e))?;
                self.write(&raw).map_err(|e| self.error(e))
            }
            None => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.error(e)),
            },
        }
    }
}
