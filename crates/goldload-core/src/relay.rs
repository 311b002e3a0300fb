//! DEPNotify command file (`/var/tmp/depnotify.log`).
//!
//! DEPNotify polls this file and acts on `Status:` and `Command:` lines.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{GoldloadError, Result};

/// One line understood by DEPNotify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    /// `Status: <text>` (empty text clears the status line).
    Status(String),
    /// Switch the progress bar to manual mode with `steps` total steps.
    DeterminateManual(usize),
    /// Advance the manual progress bar one step.
    DeterminateManualStep,
    /// Hide and reset the progress bar.
    DeterminateOffReset,
    MainTitle(String),
    MainText(String),
    /// Replace the logo with the image at the given path.
    Image(PathBuf),
    /// Show a button that restarts the machine.
    ContinueButtonRestart(String),
}

impl fmt::Display for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayCommand::Status(text) => write!(f, "Status: {text}"),
            RelayCommand::DeterminateManual(steps) => {
                write!(f, "Command: DeterminateManual: {steps}")
            }
            RelayCommand::DeterminateManualStep => write!(f, "Command: DeterminateManualStep: "),
            RelayCommand::DeterminateOffReset => write!(f, "Command: DeterminateOffReset:"),
            RelayCommand::MainTitle(title) => write!(f, "Command: MainTitle: {title}"),
            RelayCommand::MainText(text) => write!(f, "Command: MainText: {text}"),
            RelayCommand::Image(path) => write!(f, "Command: Image: {}", path.display()),
            RelayCommand::ContinueButtonRestart(label) => {
                write!(f, "Command: ContinueButtonRestart: {label}")
            }
        }
    }
}

/// Line-flushed writer for the DEPNotify command file, opened once per run.
pub struct RelayWriter {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl RelayWriter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| GoldloadError::Open {
                what: "DEPNotify relay file",
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

    pub fn send(&mut self, command: &RelayCommand) -> Result<()> {
        writeln!(self.writer, "{command}").map_err(|source| GoldloadError::Write {
            what: "DEPNotify relay file",
            source,
        })
    }

    pub fn send_all<'a>(&mut self, commands: impl IntoIterator<Item = &'a RelayCommand>) -> Result<()> {
        for command in commands {
            self.send(command)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| GoldloadError::Write {
            what: "DEPNotify relay file",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rendering() {
        assert_eq!(
            RelayCommand::Status("Successfully Installed Foo".into()).to_string(),
            "Status: Successfully Installed Foo"
        );
        assert_eq!(RelayCommand::Status(String::new()).to_string(), "Status: ");
        assert_eq!(
            RelayCommand::DeterminateManual(4).to_string(),
            "Command: DeterminateManual: 4"
        );
        assert_eq!(
            RelayCommand::DeterminateManualStep.to_string(),
            "Command: DeterminateManualStep: "
        );
        assert_eq!(
            RelayCommand::DeterminateOffReset.to_string(),
            "Command: DeterminateOffReset:"
        );
        assert_eq!(
            RelayCommand::Image(PathBuf::from("/tmp/icon.icns")).to_string(),
            "Command: Image: /tmp/icon.icns"
        );
        assert_eq!(
            RelayCommand::ContinueButtonRestart("Restart".into()).to_string(),
            "Command: ContinueButtonRestart: Restart"
        );
    }

    #[test]
    fn test_relay_lines_have_no_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depnotify.log");

        let mut relay = RelayWriter::open(&path).unwrap();
        relay
            .send_all(&[
                RelayCommand::MainTitle("Gold Load Complete!".into()),
                RelayCommand::Status(String::new()),
            ])
            .unwrap();
        drop(relay);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Command: MainTitle: Gold Load Complete!\nStatus: \n");
    }

    #[test]
    fn test_lines_visible_before_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depnotify.log");

        let mut relay = RelayWriter::open(&path).unwrap();
        relay.send(&RelayCommand::DeterminateManualStep).unwrap();

        // DEPNotify reads the file while we still hold it open.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Command: DeterminateManualStep: \n");
    }
}
