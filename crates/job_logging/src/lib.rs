//! Shared `tracing` initialization for job-orchestrator binaries, ported
//! from the reference control plane's logging crate: a stderr layer for
//! operators plus an optional size-rotated file layer, each with its own
//! `EnvFilter`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Applied when `RUST_LOG` is unset. Keeps the control loop and its
/// collaborators at `info`, everything else at the crate default.
pub const DEFAULT_LOG_FILTER: &str = "job_manager=info,job_processor=info,job_cache=info";

const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// What [`init`] needs to stand up logging for one process.
pub struct LogConfig<'a> {
    /// Used as the rotated log file's base name.
    pub app_name: &'a str,
    /// Directory to write rotated log files into. `None` disables the
    /// file layer entirely (stderr-only, e.g. for tests).
    pub log_dir: Option<PathBuf>,
    /// Forces `debug` as the baseline level regardless of `RUST_LOG`.
    pub verbose: bool,
}

/// Installs the global subscriber. Safe to call once per process; a
/// second call returns an error rather than panicking, since `set_global_default`
/// is fallible and callers (tests especially) may race to initialize it.
pub fn init(config: LogConfig<'_>) -> Result<()> {
    let base_filter = if config.verbose { "debug" } else { DEFAULT_LOG_FILTER };
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(stderr_filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    match config.log_dir {
        Some(dir) => {
            ensure_dir(&dir)?;
            let writer = SharedRollingWriter::new(dir, config.app_name)?;
            let file_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_filter));
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter);
            registry
                .with(file_layer)
                .try_init()
                .context("installing tracing subscriber with file layer")?;
        }
        None => {
            registry
                .try_init()
                .context("installing tracing subscriber without file layer")?;
        }
    }
    Ok(())
}

/// `$JOB_ORCHESTRATOR_HOME`, falling back to `~/.job-orchestrator`.
pub fn orchestrator_home() -> PathBuf {
    std::env::var_os("JOB_ORCHESTRATOR_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".job-orchestrator")
        })
}

pub fn logs_dir() -> PathBuf {
    orchestrator_home().join("logs")
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Size-rotated log file, numbered `<base>.log.1` through
/// `<base>.log.{MAX_LOG_FILES}`, oldest deleted once the cap is hit.
struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileAppender {
    fn new(dir: PathBuf, app_name: &str) -> Result<Self> {
        let mut appender = Self {
            dir,
            base_name: sanitize_name(app_name),
            max_files: MAX_LOG_FILES,
            max_size: MAX_LOG_FILE_SIZE,
            file: None,
            current_size: 0,
        };
        appender.open_current()?;
        Ok(appender)
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{index}", self.base_name))
    }

    fn open_current(&mut self) -> Result<()> {
        let path = self.current_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        self.current_size = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        self.file = Some(file);
        Ok(())
    }

    fn rotate_files(&self) -> Result<()> {
        let oldest = self.rotated_path(self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest).ok();
        }
        for index in (1..self.max_files).rev() {
            let from = self.rotated_path(index);
            let to = self.rotated_path(index + 1);
            if from.exists() {
                fs::rename(&from, &to).ok();
            }
        }
        let current = self.current_path();
        if current.exists() {
            fs::rename(&current, self.rotated_path(1)).ok();
        }
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        self.rotate_files()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
        self.open_current()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
        Ok(())
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > self.max_size && self.current_size > 0 {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "log file not open"))?;
        let written = file.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `MakeWriter` over a shared [`RollingFileAppender`], so every `tracing`
/// event writes through the same mutex-guarded rotation state regardless
/// of which thread or task produced it.
#[derive(Clone)]
pub struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl SharedRollingWriter {
    fn new(dir: PathBuf, app_name: &str) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingFileAppender::new(dir, app_name)?)),
        })
    }
}

pub struct SharedRollingWriterGuard {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl Write for SharedRollingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .expect("rolling file appender mutex poisoned")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .expect("rolling file appender mutex poisoned")
            .flush()
    }
}

impl<'a> MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedRollingWriterGuard { inner: self.inner.clone() }
    }
}
