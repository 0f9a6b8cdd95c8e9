//! Invocation of external command-line tools.

use std::ffi::OsStr;
use std::process::Command;

use crate::error::ProcessError;

/// Runs `program` with `args` and returns its stdout.
///
/// A program that cannot be spawned is [`ProcessError::ToolMissing`]; a
/// non-zero exit is [`ProcessError::ToolFailed`] carrying stderr.
pub fn run_tool<I, S>(program: &str, args: I) -> Result<Vec<u8>, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ProcessError::ToolMissing {
            program: program.to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ProcessError::ToolFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}
