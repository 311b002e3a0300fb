//! Persistent, timestamped run log (`/var/log/newGoldLoad.log`).

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{GoldloadError, Result};

/// Prefix format for every run-log line.
pub const TIMESTAMP_FORMAT: &str = "%m-%d-%y %H:%M:%S";

/// Append-only run log, opened once per run.
///
/// Every line of a message gets its own timestamp, so multi-line agent
/// output stays greppable. Lines are flushed as they are written.
pub struct RunLog {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl RunLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| GoldloadError::Open {
                what: "run log",
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            writer: LineWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, message: &str) -> Result<()> {
        self.write_at(Local::now(), message)
    }

    pub fn write_at(&mut self, at: DateTime<Local>, message: &str) -> Result<()> {
        let stamp = at.format(TIMESTAMP_FORMAT);
        for line in message.lines() {
            writeln!(self.writer, "{stamp}: {line}").map_err(|source| GoldloadError::Write {
                what: "run log",
                source,
            })?;
        }
        Ok(())
    }

    pub fn write_all<'a>(&mut self, messages: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let now = Local::now();
        for message in messages {
            self.write_at(now, message)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| GoldloadError::Write {
            what: "run log",
            source,
        })
    }
}
