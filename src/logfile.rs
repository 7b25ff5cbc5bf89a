//! Per-probe rotating log file.
//!
//! Each probe can keep a plain-text log at `<dir>/logs/<name>/<name>.log`
//! with one line per lifecycle transition and per collection error:
//!
//! ```text
//! 2024-05-01 12:00:00,123 - cpu - INFO - Data collection ACTIVATED
//! ```
//!
//! The file is rotated once it would grow past [`LOG_MAX_BYTES`], keeping
//! [`LOG_BACKUPS`] older files as `<name>.log.1` (newest) … `.5` (oldest).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tracing::Level;

use crate::config::{LOG_BACKUPS, LOG_MAX_BYTES};
use crate::error::ProbeError;

// ─── Rotating writer ─────────────────────────────────────────────

/// Append-only file that rotates by size.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
            backups,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            let oldest = self.backup_path(self.backups);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..self.backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

// ─── Probe log ───────────────────────────────────────────────────

/// The log side channel of a single probe.
#[derive(Debug)]
pub struct ProbeLog {
    probe: String,
    file: Mutex<RotatingFile>,
}

impl ProbeLog {
    /// Create `<dir>/logs/<probe>/` if needed and open `<probe>.log` in it.
    pub fn open(dir: &Path, probe: &str) -> Result<Self, ProbeError> {
        Self::open_with_limits(dir, probe, LOG_MAX_BYTES, LOG_BACKUPS)
    }

    pub fn open_with_limits(
        dir: &Path,
        probe: &str,
        max_bytes: u64,
        backups: usize,
    ) -> Result<Self, ProbeError> {
        let folder = dir.join("logs").join(probe);
        let path = folder.join(format!("{probe}.log"));
        let init_err = |source| ProbeError::LoggingInit {
            probe: probe.to_owned(),
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&folder).map_err(init_err)?;
        let file = RotatingFile::open(&path, max_bytes, backups).map_err(init_err)?;

        let log = Self {
            probe: probe.to_owned(),
            file: Mutex::new(file),
        };
        log.info("Initialized and logging turned ON");
        Ok(log)
    }

    pub fn path(&self) -> PathBuf {
        self.file.lock().path().to_path_buf()
    }

    pub fn info(&self, msg: &str) {
        self.write(Level::INFO, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.write(Level::WARN, msg);
    }

    pub fn error(&self, msg: &str) {
        self.write(Level::ERROR, msg);
    }

    /// Append one formatted line. A failed write is reported through
    /// tracing and otherwise ignored.
    pub fn write(&self, level: Level, msg: &str) {
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        let line = format!("{ts} - {} - {level} - {msg}\n", self.probe);
        let mut file = self.file.lock();
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            tracing::warn!(probe = %self.probe, error = %e, "Failed to write probe log");
        }
    }
}
