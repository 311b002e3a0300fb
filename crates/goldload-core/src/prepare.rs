//! Start-of-run rotation of the product outputs.

use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{GoldloadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    Removed,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rotation {
    pub run_log: Removal,
    pub relay: Removal,
}

/// Delete the previous run log and relay file, then create an empty run log.
///
/// A missing file is not an error. Any other failure is.
pub fn rotate(run_log: &Path, relay: &Path) -> Result<Rotation> {
    let run_log_removal = remove_previous("run log", run_log)?;
    let relay_removal = remove_previous("relay file", relay)?;

    std::fs::File::create(run_log).map_err(|source| GoldloadError::Open {
        what: "run log",
        path: run_log.to_path_buf(),
        source,
    })?;

    Ok(Rotation {
        run_log: run_log_removal,
        relay: relay_removal,
    })
}

fn remove_previous(what: &'static str, path: &Path) -> Result<Removal> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed previous {what}");
            Ok(Removal::Removed)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "Previous {what} does not exist");
            Ok(Removal::Absent)
        }
        Err(source) => Err(GoldloadError::Open {
            what,
            path: path.to_path_buf(),
            source,
        }),
    }
}
