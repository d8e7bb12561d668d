//! Output sinks for archives.
//!
//! A sink is acquired before the first entry is written and is either
//! committed (the archive is complete) or dropped (the archive is abandoned).
//! [`FileSink`] writes to `<destination>.part` and only renames onto the
//! destination on commit; dropping an uncommitted `FileSink` removes the
//! scratch file, falling back to truncating it when removal fails.
//!
//! The archive writer reaches its sink through a [`SinkGuard`]. Once the guard
//! is cut off, nothing more reaches the sink, so an abandoned archive never
//! gains a central directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Scratch file suffix used while an archive is being written.
pub const SCRATCH_SUFFIX: &str = ".part";

/// A writable, seekable destination for one archive.
pub trait ArchiveSink: Write + Seek {
    /// What the caller gets back once the archive is complete.
    type Output;

    /// Make the written bytes durable at their final location.
    fn commit(self) -> io::Result<Self::Output>;

    /// Throw away the bytes written so far. Called once when the archive is
    /// abandoned. Sinks that cannot take bytes back keep them, but they never
    /// receive a trailer either way.
    fn discard(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory sink; the committed output is the archive bytes.
impl ArchiveSink for Cursor<Vec<u8>> {
    type Output = Vec<u8>;

    fn commit(self) -> io::Result<Vec<u8>> {
        Ok(self.into_inner())
    }

    fn discard(&mut self) -> io::Result<()> {
        self.get_mut().clear();
        self.set_position(0);
        Ok(())
    }
}

/// Pass-through wrapper that can be cut off from its sink.
///
/// After [`cut_off`](SinkGuard::cut_off) the wrapped sink is discarded and
/// later writes and seeks only move a virtual cursor. The zip writer finalizes
/// on drop; a cut-off guard lets that finalize run to completion without
/// touching the real output.
pub struct SinkGuard<S: ArchiveSink> {
    inner: Option<S>,
    cut: Arc<AtomicBool>,
    detached: bool,
    position: u64,
    len: u64,
}

impl<S: ArchiveSink> SinkGuard<S> {
    pub fn new(inner: S) -> Self {
        SinkGuard {
            inner: Some(inner),
            cut: Arc::new(AtomicBool::new(false)),
            detached: false,
            position: 0,
            len: 0,
        }
    }

    /// Handle that cuts this guard off while something else owns it.
    pub fn cut_handle(&self) -> CutHandle {
        CutHandle(Arc::clone(&self.cut))
    }

    pub fn cut_off(&mut self) -> io::Result<()> {
        self.cut.store(true, Ordering::SeqCst);
        self.detach()
    }

    pub fn is_cut_off(&self) -> bool {
        self.cut.load(Ordering::SeqCst)
    }

    /// Hand back the sink for commit. Fails once the guard is cut off.
    pub fn into_inner(mut self) -> io::Result<S> {
        if self.is_cut_off() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "archive sink was cut off",
            ));
        }
        self.inner.take().ok_or_else(closed)
    }

    fn sink(&mut self) -> io::Result<&mut S> {
        self.inner.as_mut().ok_or_else(closed)
    }

    /// Take over the cursor and drop what the sink holds. Runs once.
    fn detach(&mut self) -> io::Result<()> {
        if self.detached || !self.is_cut_off() {
            return Ok(());
        }
        let sink = self.sink()?;
        let position = sink.stream_position()?;
        let len = sink.seek(SeekFrom::End(0))?;
        sink.discard()?;
        self.position = position;
        self.len = len.max(position);
        self.detached = true;
        debug!(bytes = len, "Discarded partial archive output");
        Ok(())
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive sink is closed")
}

impl<S: ArchiveSink> Write for SinkGuard<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.detach()?;
        if self.detached {
            self.position += buf.len() as u64;
            self.len = self.len.max(self.position);
            return Ok(buf.len());
        }
        self.sink()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.detach()?;
        if self.detached {
            return Ok(());
        }
        self.sink()?.flush()
    }
}

impl<S: ArchiveSink> Seek for SinkGuard<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.detach()?;
        if !self.detached {
            return self.sink()?.seek(pos);
        }
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
        };
        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of archive")
        })?;
        Ok(self.position)
    }
}

impl<S: ArchiveSink> Drop for SinkGuard<S> {
    fn drop(&mut self) {
        if self.inner.is_none() {
            return;
        }
        if let Err(e) = self.detach() {
            warn!(error = %e, "Could not discard partial archive output");
        }
    }
}

/// Shared switch for cutting a [`SinkGuard`] off while something else owns it.
#[derive(Debug, Clone)]
pub struct CutHandle(Arc<AtomicBool>);

impl CutHandle {
    pub fn cut_off(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// File sink with scratch-file staging.
#[derive(Debug)]
pub struct FileSink {
    file: Option<File>,
    scratch_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl FileSink {
    /// Open a scratch file for `final_path`.
    ///
    /// Fails with `AlreadyExists` if the destination or its scratch file is
    /// already present, so neither an earlier archive nor a concurrent export
    /// to the same name is overwritten.
    pub fn create(final_path: impl Into<PathBuf>) -> io::Result<Self> {
        let final_path = final_path.into();
        if final_path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", final_path.display()),
            ));
        }

        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let scratch_path = scratch_path_for(&final_path);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&scratch_path)?;

        debug!(path = %scratch_path.display(), "Opened scratch archive file");

        Ok(FileSink {
            file: Some(file),
            scratch_path,
            final_path,
            committed: false,
        })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "file sink is closed"))
    }
}

/// `export.eln` → `export.eln.part`
pub fn scratch_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(SCRATCH_SUFFIX);
    PathBuf::from(name)
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl Seek for FileSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut()?.seek(pos)
    }
}

impl ArchiveSink for FileSink {
    type Output = PathBuf;

    fn commit(mut self) -> io::Result<PathBuf> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "file sink is closed"))?;
        file.flush()?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.scratch_path, &self.final_path)?;
        self.committed = true;

        debug!(path = %self.final_path.display(), "Committed archive file");
        Ok(self.final_path.clone())
    }

    fn discard(&mut self) -> io::Result<()> {
        let file = self.file_mut()?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        discard_partial(&self.scratch_path);
    }
}

/// Remove a partial archive, or truncate it to zero bytes if it cannot be removed.
fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed partial archive"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove partial archive, truncating");
            if let Err(e) = OpenOptions::new().write(true).truncate(true).open(path) {
                warn!(path = %path.display(), error = %e, "Could not truncate partial archive");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_path_for() {
        assert_eq!(
            scratch_path_for(Path::new("/tmp/out/export.eln")),
            PathBuf::from("/tmp/out/export.eln.part")
        );
    }

    #[test]
    fn test_file_sink_commit_renames() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("a.eln");

        let mut sink = FileSink::create(&target).unwrap();
        assert!(sink.scratch_path().exists());
        sink.write_all(b"payload").unwrap();

        let path = sink.commit().unwrap();
        assert_eq!(path, target);
        assert_eq!(fs::read(&target).unwrap(), b"payload");
        assert!(!scratch_path_for(&target).exists());
    }

    #[test]
    fn test_file_sink_drop_removes_scratch() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.eln");

        {
            let mut sink = FileSink::create(&target).unwrap();
            sink.write_all(b"partial").unwrap();
        }

        assert!(!target.exists());
        assert!(!scratch_path_for(&target).exists());
    }

    #[test]
    fn test_file_sink_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.eln");
        fs::write(&target, b"old").unwrap();

        let err = FileSink::create(&target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }

    #[test]
    fn test_file_sink_refuses_busy_scratch_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.eln");

        let mut first = FileSink::create(&target).unwrap();
        first.write_all(b"first").unwrap();

        let err = FileSink::create(&target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        assert_eq!(first.commit().unwrap(), target);
        assert_eq!(fs::read(&target).unwrap(), b"first");
    }

    #[test]
    fn test_file_sink_discard_truncates() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.eln");

        let mut sink = FileSink::create(&target).unwrap();
        sink.write_all(b"partial").unwrap();
        sink.discard().unwrap();
        assert_eq!(fs::metadata(sink.scratch_path()).unwrap().len(), 0);
    }

    #[test]
    fn test_guard_passes_through_until_cut() {
        let mut guard = SinkGuard::new(Cursor::new(Vec::new()));
        guard.write_all(b"header").unwrap();
        assert_eq!(guard.stream_position().unwrap(), 6);

        let sink = guard.into_inner().unwrap();
        assert_eq!(sink.commit().unwrap(), b"header");
    }

    #[test]
    fn test_cut_guard_keeps_cursor_but_drops_bytes() {
        let mut guard = SinkGuard::new(Cursor::new(Vec::new()));
        guard.write_all(b"local header").unwrap();

        guard.cut_handle().cut_off();
        assert!(guard.is_cut_off());

        // Writes after the cut move only the virtual cursor.
        guard.write_all(b"trailer").unwrap();
        assert_eq!(guard.stream_position().unwrap(), 19);
        assert_eq!(guard.seek(SeekFrom::End(-7)).unwrap(), 12);
        assert_eq!(guard.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert!(guard.seek(SeekFrom::Current(-1)).is_err());
        assert_eq!(guard.inner.as_ref().unwrap().get_ref().len(), 0);

        let err = guard.into_inner().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_cut_guard_removes_file_output() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.eln");

        {
            let mut guard = SinkGuard::new(FileSink::create(&target).unwrap());
            guard.write_all(b"partial").unwrap();
            guard.cut_off().unwrap();
            guard.write_all(b"trailer").unwrap();
        }

        assert!(!target.exists());
        assert!(!scratch_path_for(&target).exists());
    }

    #[test]
    fn test_cursor_sink_commit_returns_bytes() {
        let mut sink = Cursor::new(Vec::new());
        sink.write_all(b"abc").unwrap();
        assert_eq!(sink.commit().unwrap(), b"abc");
    }
}
