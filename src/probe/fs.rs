//! Exact filesystem size detection.
//!
//! ext2/3/4 report block count and block size through `dumpe2fs -h`; xfs
//! through `xfs_info` on the mount point. The planner compares the result
//! against the backing device to decide whether a grow step is still
//! needed.

use crate::errors::ProbeError;
use crate::model::FsKind;
use crate::runner::CommandRunner;
use std::path::Path;

/// Parse a numeric `Field name:  value` line from dumpe2fs output.
pub fn parse_dumpe2fs_field(output: &str, field: &str) -> Option<u64> {
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix(field) {
            return rest.trim().parse().ok();
        }
    }
    None
}

/// Filesystem size in bytes from `dumpe2fs -h` output.
pub fn parse_ext_size(output: &str) -> Result<u64, ProbeError> {
    let count = parse_dumpe2fs_field(output, "Block count:")
        .ok_or_else(|| ProbeError::parse("dumpe2fs", "Block count:"))?;
    let size = parse_dumpe2fs_field(output, "Block size:")
        .ok_or_else(|| ProbeError::parse("dumpe2fs", "Block size:"))?;
    Ok(count * size)
}

/// Filesystem size in bytes from `xfs_info` output.
///
/// The data section line reads `data = bsize=4096 blocks=26214400, imaxpct=25`.
pub fn parse_xfs_size(output: &str) -> Result<u64, ProbeError> {
    for line in output.lines() {
        if !line.trim_start().starts_with("data") {
            continue;
        }
        let mut bsize = None;
        let mut blocks = None;
        for token in line.split_whitespace() {
            if let Some(value) = token.strip_prefix("bsize=") {
                bsize = value.trim_end_matches(',').parse::<u64>().ok();
            }
            if let Some(value) = token.strip_prefix("blocks=") {
                blocks = value.trim_end_matches(',').parse::<u64>().ok();
            }
        }
        if let (Some(bsize), Some(blocks)) = (bsize, blocks) {
            return Ok(bsize * blocks);
        }
    }
    Err(ProbeError::parse("xfs_info", "data section"))
}

/// Current size of the filesystem, when its kind exposes one.
///
/// A probe utility that is absent or refuses the device yields `None`
/// rather than an error; the planner then falls back to growth-driven
/// heuristics.
pub fn fs_info(
    runner: &dyn CommandRunner,
    kind: &FsKind,
    device: &Path,
    mount_point: &Path,
) -> Result<Option<u64>, ProbeError> {
    if kind.is_ext() {
        let device = device.to_string_lossy();
        let output = runner.run("dumpe2fs", &["-h", &device])?;
        if !output.success() {
            return Ok(None);
        }
        return parse_ext_size(&output.stdout).map(Some);
    }

    if matches!(kind, FsKind::Xfs) {
        let mount_point = mount_point.to_string_lossy();
        let output = runner.run("xfs_info", &[&mount_point])?;
        if !output.success() {
            return Ok(None);
        }
        return parse_xfs_size(&output.stdout).map(Some);
    }

    Ok(None)
}
