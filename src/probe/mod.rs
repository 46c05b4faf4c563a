//! Read-only queries over the host's storage utilities.
//!
//! Each submodule pairs a pure parser (captured output string in, record
//! set out) with a thin wrapper that obtains the output through a
//! [`CommandRunner`]. The parsers are the seam the test suite depends on.

pub mod fs;
pub mod lsblk;
pub mod lvm;
pub mod mounts;
pub mod parted;

use crate::errors::ProbeError;
use crate::runner::CommandRunner;

/// Run a utility and return stdout, failing on a non-zero exit.
pub(crate) fn run_ok(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<String, ProbeError> {
    let output = runner.run(program, args)?;
    if !output.success() {
        return Err(ProbeError::Failed {
            utility: program.to_string(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Parse a decimal byte count, reporting the offending token on failure.
pub(crate) fn parse_bytes(utility: &str, token: &str) -> Result<u64, ProbeError> {
    token
        .trim()
        .parse()
        .map_err(|_| ProbeError::parse(utility, token.trim()))
}
