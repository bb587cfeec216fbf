//! Backend that spools envelopes to a local directory.
//!
//! Each envelope becomes one `<unix-millis>-<seq>.envelope` file, written
//! through a temporary file and renamed into place so readers never see a
//! partial envelope. Names sort in write order.

use std::{
    any::Any,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use log::debug;
use tempfile::NamedTempFile;

use crate::{
    LOGGER_TARGET,
    backend::{Backend, BackendError, SendOptions},
    clock::SharedClock,
};

/// File extension of spooled envelopes.
pub const SPOOL_EXTENSION: &str = "envelope";

/// Writes envelopes into `dir` instead of sending them.
pub struct SpoolBackend {
    dir: PathBuf,
    seq: AtomicU64,
    clock: SharedClock,
}

impl SpoolBackend {
    /// Create the backend, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, clock: SharedClock) -> Result<Self, BackendError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
            clock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Spooled envelope paths, oldest first.
    pub fn spooled(&self) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == SPOOL_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn next_name(&self) -> String {
        let millis = self.clock.now().timestamp_millis().max(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{millis:013}-{seq:06}.{SPOOL_EXTENSION}")
    }
}

impl Backend for SpoolBackend {
    fn send_data(&self, data: &[u8], _options: &SendOptions) -> Result<(), BackendError> {
        let target = self.dir.join(self.next_name());
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&target).map_err(|err| err.error)?;
        debug!(target: LOGGER_TARGET, "spooled envelope to {}", target.display());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for SpoolBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolBackend")
            .field("dir", &self.dir)
            .finish()
    }
}
