// Append-only rotating file sink (C8, spec §4.8): writes never block
// request handling on failure, and the file is rotated cyclically through
// up to `max_backups` numbered backups once it reaches `rotate_bytes`.
//
// `.1` is the newest backup, `.N` the oldest; the oldest is dropped on
// rotation. This is plugged into `tracing_subscriber` as a second
// `fmt::layer()` behind a `tracing_appender::non_blocking` writer, the
// same pattern the OAuth credential persistence in `oauth::manager` uses
// for append-then-check file IO, so logging never stalls the async
// runtime on disk contention.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub struct RollingFile {
    path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    file: File,
    written: u64,
}

impl RollingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, max_backups: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self { path, max_bytes, max_backups, file, written })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(format!(".{n}"));
        PathBuf::from(p)
    }

    /// Rotate `.max_backups-1 -> .max_backups` down to `log -> .1`,
    /// dropping whatever already occupies `.max_backups`.
    fn rotate(&mut self) -> io::Result<()> {
        let oldest = self.backup_path(self.max_backups);
        if oldest.exists() {
            fs::remove_file(&oldest).ok();
        }
        for n in (1..self.max_backups).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        if self.max_backups > 0 {
            fs::rename(&self.path, self.backup_path(1)).ok();
        }
        self.file = OpenOptions::new().create(true).append(true).truncate(false).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.max_bytes {
            // Best-effort: a failed rotation still lets the write through
            // to the (now oversized) current file rather than raising.
            let _ = self.rotate();
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// `tracing_appender::writer::MakeWriter` glue: one `RollingFile` is
/// opened per process and cloned (via a new file handle sharing rotation
/// state through `Arc<Mutex<_>>`) for every log write.
#[derive(Clone)]
pub struct RollingFileMakeWriter {
    inner: std::sync::Arc<std::sync::Mutex<RollingFile>>,
}

impl RollingFileMakeWriter {
    pub fn new(path: impl AsRef<Path>, max_bytes: u64, max_backups: usize) -> io::Result<Self> {
        Ok(Self { inner: std::sync::Arc::new(std::sync::Mutex::new(RollingFile::open(path.as_ref(), max_bytes, max_backups)?)) })
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingFileMakeWriter {
    type Writer = RollingFileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RollingFileHandle { inner: self.inner.clone() }
    }
}

pub struct RollingFileHandle {
    inner: std::sync::Arc<std::sync::Mutex<RollingFile>>,
}

impl Write for RollingFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Best-effort (spec §4.8): a poisoned lock or IO failure here must
        // never propagate into the caller's request-handling path.
        match self.inner.lock() {
            Ok(mut guard) => guard.write(buf).or(Ok(buf.len())),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.lock() {
            Ok(mut guard) => guard.flush().or(Ok(())),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn rotates_when_threshold_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.log");
        let mut f = RollingFile::open(&path, 16, 3).unwrap();

        f.write_all(b"0123456789abcdef").unwrap(); // fills to 16 bytes exactly
        f.write_all(b"more").unwrap(); // triggers rotation on next write
        f.flush().unwrap();

        assert!(dir.path().join("gateway.log.1").exists());
    }

    #[test]
    fn best_effort_write_never_panics_on_bad_path() {
        // opening succeeds even if nested dirs don't exist yet
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gateway.log");
        let mut f = RollingFile::open(&path, 1024, 1).unwrap();
        f.write_all(b"hello").unwrap();
        f.flush().unwrap();

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");
    }
}
