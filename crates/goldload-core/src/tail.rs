//! Polling tail over a live, append-only log file.
//!
//! The tail starts at the end of the file as it was when opened, so only
//! lines appended afterwards are observed. There is no rewind: a line handed
//! out is consumed.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::debug;

use crate::error::{GoldloadError, Result};

/// Default sleep between polls when no complete line is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct LogTail {
    path: PathBuf,
    reader: BufReader<File>,
    /// Device and inode of the open file, where the platform has them.
    identity: Option<(u64, u64)>,
    offset: u64,
    pending: Vec<u8>,
    poll_interval: Duration,
}

impl LogTail {
    /// Open `path` and position the tail at its current end.
    pub async fn open(path: impl AsRef<Path>, poll_interval: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)
            .await
            .map_err(|source| GoldloadError::Open {
                what: "agent log",
                path: path.clone(),
                source,
            })?;
        let identity = file_identity(&file.metadata().await?);
        let offset = file.seek(SeekFrom::End(0)).await?;
        debug!(path = %path.display(), offset, "Tailing log");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            identity,
            offset,
            pending: Vec::new(),
            poll_interval,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next complete line, polling at the fixed interval.
    ///
    /// Never returns `Ok` without a line; callers bound the wait with a
    /// timeout.
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = self.try_next_line().await? {
                return Ok(line);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Return the next complete line if one is already in the file.
    ///
    /// A trailing fragment without a newline is kept until the writer
    /// finishes it.
    pub async fn try_next_line(&mut self) -> Result<Option<String>> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read == 0 {
                self.reopen_if_rotated().await?;
                return Ok(None);
            }
            self.offset += read as u64;

            if self.pending.last() == Some(&b'\n') {
                let raw = std::mem::take(&mut self.pending);
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
                return Ok(Some(line.to_string()));
            }
        }
    }

    /// Restart from the top when the path now names a different file
    /// (replace-style rotation) or the file shrank below our offset
    /// (in-place truncation).
    async fn reopen_if_rotated(&mut self) -> Result<()> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "Log temporarily unavailable");
                return Ok(());
            }
        };
        let identity = file_identity(&meta);
        let replaced = identity.is_some() && identity != self.identity;
        if !replaced && meta.len() >= self.offset {
            return Ok(());
        }

        debug!(
            path = %self.path.display(),
            offset = self.offset,
            len = meta.len(),
            replaced,
            "Log rotated, restarting from the beginning"
        );
        let file = File::open(&self.path)
            .await
            .map_err(|source| GoldloadError::Open {
                what: "agent log",
                path: self.path.clone(),
                source,
            })?;
        self.identity = file_identity(&file.metadata().await?);
        self.reader = BufReader::new(file);
        self.offset = 0;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FAST_POLL: Duration = Duration::from_millis(5);

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_tail_skips_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "old line 1\nold line 2\n").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        assert_eq!(tail.try_next_line().await.unwrap(), None);

        append(&path, "new line\n");
        assert_eq!(tail.next_line().await.unwrap(), "new line");
    }

    #[tokio::test]
    async fn test_tail_yields_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        append(&path, "a\nb\r\nc\n");

        assert_eq!(tail.next_line().await.unwrap(), "a");
        assert_eq!(tail.next_line().await.unwrap(), "b");
        assert_eq!(tail.next_line().await.unwrap(), "c");
    }

    #[tokio::test]
    async fn test_tail_waits_for_line_appended_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            append(&writer_path, "late\n");
        });

        let line = tokio::time::timeout(Duration::from_secs(5), tail.next_line())
            .await
            .expect("tail should see the late line")
            .unwrap();
        assert_eq!(line, "late");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_tail_buffers_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        append(&path, "Executing Pol");
        assert_eq!(tail.try_next_line().await.unwrap(), None);

        append(&path, "icy Install Foo\n");
        assert_eq!(
            tail.try_next_line().await.unwrap().as_deref(),
            Some("Executing Policy Install Foo")
        );
    }

    #[tokio::test]
    async fn test_tail_restarts_after_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "a fairly long line of history\n").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        std::fs::write(&path, "fresh\n").unwrap();

        // First poll notices the shrink, second reads from the top.
        assert_eq!(tail.try_next_line().await.unwrap(), None);
        assert_eq!(tail.try_next_line().await.unwrap().as_deref(), Some("fresh"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tail_follows_replaced_file_longer_than_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "short\n").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        std::fs::rename(&path, dir.path().join("jamf.log.0")).unwrap();
        std::fs::write(&path, "rotated line one\nrotated line two\n").unwrap();

        // The new file is already past the old offset; identity gives it away.
        assert_eq!(tail.try_next_line().await.unwrap(), None);
        assert_eq!(
            tail.try_next_line().await.unwrap().as_deref(),
            Some("rotated line one")
        );
        assert_eq!(
            tail.try_next_line().await.unwrap().as_deref(),
            Some("rotated line two")
        );
    }

    #[tokio::test]
    async fn test_open_missing_log_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = LogTail::open(dir.path().join("missing.log"), FAST_POLL)
            .await
            .err()
            .expect("missing log should not open");
        assert!(err.to_string().contains("agent log"));
    }
}
