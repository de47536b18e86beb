//! Stage gating
//!
//! Each stage (fetch, decompress, convert) is deterministic given its input
//! and produces exactly one file. A stage is skipped when that file exists.
//! Outputs are first written to a `.part` sibling and renamed into place, so
//! an interrupted stage leaves nothing the gate would accept.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Decompress,
    Convert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Decompress => write!(f, "decompress"),
            Stage::Convert => write!(f, "convert"),
        }
    }
}

/// `false` iff the stage's output already exists.
///
/// A check that cannot be answered (permissions, broken mount) counts as
/// "does not exist", so the stage runs.
pub fn should_run(output: &Path) -> bool {
    !matches!(output.try_exists(), Ok(true))
}

/// [`should_run`] with an operator-facing log line
pub fn gate(stage: Stage, output: &Path) -> bool {
    let run = should_run(output);
    if run {
        debug!(stage = %stage, output = %output.display(), "Stage output missing, running");
    } else {
        info!(stage = %stage, output = %output.display(), "Output already exists, skipping stage");
    }
    run
}

/// Sibling path an artifact is written to while its stage is in progress
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".part");
    output.with_file_name(name)
}

/// Move a finished `.part` file into its final place
pub fn promote_partial(output: &Path) -> std::io::Result<()> {
    std::fs::rename(partial_path(output), output)
}
