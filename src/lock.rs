//! Exclusive per-disk locks.
//!
//! A run holds a non-blocking `flock(2)` on every disk in its graph from
//! planning through execution, so two concurrent invocations can't edit
//! the same partition table.

use crate::errors::GraphResolveError;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Held locks; dropping releases them.
#[derive(Debug)]
pub struct DiskLocks {
    _locks: Vec<Flock<File>>,
}

pub fn lock_disks<'a>(
    disks: impl IntoIterator<Item = &'a Path>,
) -> Result<DiskLocks, GraphResolveError> {
    let mut locks = Vec::new();

    for disk in disks {
        let file = File::open(disk).map_err(|source| GraphResolveError::LockFailed {
            disk: disk.to_path_buf(),
            source,
        })?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => locks.push(lock),
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(GraphResolveError::DiskBusy(disk.to_path_buf()));
            }
            Err((_, errno)) => {
                return Err(GraphResolveError::LockFailed {
                    disk: disk.to_path_buf(),
                    source: std::io::Error::from(errno),
                });
            }
        }
    }

    Ok(DiskLocks { _locks: locks })
}

/// Convenience over owned paths.
pub fn lock_disk_paths(disks: &[PathBuf]) -> Result<DiskLocks, GraphResolveError> {
    lock_disks(disks.iter().map(PathBuf::as_path))
}
