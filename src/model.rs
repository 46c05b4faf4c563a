//! Storage entities and partition-table geometry.
//!
//! All sizes and offsets are bytes. Entities are built once during probing
//! and stay immutable through planning; plan steps reference them by stable
//! identifiers (disk path + partition number, VG name, LV path) so a step's
//! meaning survives a reboot.

use std::path::{Path, PathBuf};

const SECTOR: u64 = 512;

/// Free-space gaps below this are not worth a partition.
pub const MIN_FREE_BYTES: u64 = 1024 * 1024;

/// On-disk partition table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartTableKind {
    Msdos,
    Gpt,
    /// No table: the disk carries a filesystem or PV directly.
    None,
}

impl PartTableKind {
    /// First byte a partition may occupy.
    pub fn first_usable(&self) -> u64 {
        match self {
            // Sector 63, the classic DOS alignment.
            PartTableKind::Msdos => 63 * SECTOR,
            // Protective MBR + header + 32 sectors of partition entries.
            PartTableKind::Gpt => 34 * SECTOR,
            PartTableKind::None => 0,
        }
    }

    /// Last byte a partition may occupy on a disk of `disk_size` bytes.
    pub fn last_usable(&self, disk_size: u64) -> u64 {
        match self {
            PartTableKind::Msdos => disk_size - 1,
            // The mirror entry array and mirror header occupy the last
            // 33 sectors.
            PartTableKind::Gpt => disk_size - 33 * SECTOR - 1,
            PartTableKind::None => disk_size.saturating_sub(1),
        }
    }

    /// msdos allows four primaries; this tool never creates logical
    /// partitions.
    pub fn max_partitions(&self) -> Option<usize> {
        match self {
            PartTableKind::Msdos => Some(4),
            PartTableKind::Gpt => Some(128),
            PartTableKind::None => Some(0),
        }
    }
}

/// Filesystem kind as reported by the device tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsKind {
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Other(String),
}

impl FsKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "ext2" => FsKind::Ext2,
            "ext3" => FsKind::Ext3,
            "ext4" => FsKind::Ext4,
            "xfs" => FsKind::Xfs,
            other => FsKind::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FsKind::Ext2 => "ext2",
            FsKind::Ext3 => "ext3",
            FsKind::Ext4 => "ext4",
            FsKind::Xfs => "xfs",
            FsKind::Other(name) => name,
        }
    }

    pub fn is_ext(&self) -> bool {
        matches!(self, FsKind::Ext2 | FsKind::Ext3 | FsKind::Ext4)
    }

    /// Whether this tool knows how to grow the filesystem online.
    pub fn growable(&self) -> bool {
        self.is_ext() || matches!(self, FsKind::Xfs)
    }
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub disk: PathBuf,
    pub number: u32,
    pub start: u64,
    /// Inclusive.
    pub last: u64,
    pub lvm_flag: bool,
    /// Filesystem signature reported by the device tree, if any.
    pub fstype: Option<String>,
    /// Mounted, held by device-mapper, or backing an active PV.
    pub in_use: bool,
}

impl Partition {
    pub fn size(&self) -> u64 {
        self.last - self.start + 1
    }

    pub fn device(&self) -> PathBuf {
        partition_device(&self.disk, self.number)
    }
}

#[derive(Debug, Clone)]
pub struct Disk {
    pub path: PathBuf,
    pub size: u64,
    pub table: PartTableKind,
    pub major: u32,
    pub minor: u32,
    /// Sorted by start byte.
    pub partitions: Vec<Partition>,
}

impl Disk {
    pub fn in_use(&self) -> bool {
        self.partitions.iter().any(|p| p.in_use)
    }

    /// Contiguous byte ranges not covered by any partition, within the
    /// table's usable window. Gaps under [`MIN_FREE_BYTES`] are dropped.
    pub fn free_spaces(&self) -> Vec<FreeSpace> {
        if self.table == PartTableKind::None {
            return Vec::new();
        }

        let first = self.table.first_usable();
        let last = self.table.last_usable(self.size);
        let mut gaps = Vec::new();
        let mut cursor = first;

        for partition in &self.partitions {
            if partition.start > cursor && partition.start - cursor >= MIN_FREE_BYTES {
                gaps.push(FreeSpace {
                    disk: self.path.clone(),
                    start: cursor,
                    last: partition.start - 1,
                });
            }
            cursor = cursor.max(partition.last + 1);
        }

        if cursor <= last && last - cursor + 1 >= MIN_FREE_BYTES {
            gaps.push(FreeSpace {
                disk: self.path.clone(),
                start: cursor,
                last,
            });
        }

        gaps
    }
}

/// A contiguous unpartitioned byte range on a disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSpace {
    pub disk: PathBuf,
    pub start: u64,
    /// Inclusive.
    pub last: u64,
}

impl FreeSpace {
    pub fn len(&self) -> u64 {
        self.last - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.start
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalVolume {
    pub device: PathBuf,
    /// None when the PV is not assigned to any volume group.
    pub vg: Option<String>,
    pub pv_size: u64,
    pub pv_free: u64,
    /// Size of the backing block device as LVM sees it.
    pub dev_size: u64,
    /// Offset of the first extent (PV metadata lives before it).
    pub pe_start: u64,
}

impl PhysicalVolume {
    /// Bytes the PV would gain from `pvresize`, i.e. how far the backing
    /// device has outgrown it.
    pub fn lagging_bytes(&self) -> u64 {
        (self.dev_size - self.pe_start).saturating_sub(self.pv_size)
    }
}

#[derive(Debug, Clone)]
pub struct VolumeGroup {
    pub name: String,
    pub extent_size: u64,
    pub extent_count: u64,
    pub free_extents: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct LogicalVolume {
    pub name: String,
    pub vg: String,
    pub path: PathBuf,
    pub size: u64,
    pub major: u32,
    pub minor: u32,
}

#[derive(Debug, Clone)]
pub struct Filesystem {
    pub kind: FsKind,
    pub device: PathBuf,
    /// Exact filesystem size when the kind's probe can report one.
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Mount {
    pub point: PathBuf,
    pub device: PathBuf,
    pub fstype: String,
}

/// Device node for partition `number` of `disk`.
///
/// Disks whose name ends in a digit (loop0, nvme0n1, mmcblk0) get a `p`
/// separator.
pub fn partition_device(disk: &Path, number: u32) -> PathBuf {
    let name = disk.to_string_lossy();
    if name.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{name}p{number}"))
    } else {
        PathBuf::from(format!("{name}{number}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;
    const DISK_100G: u64 = 100 * GB;

    fn part(disk: &str, number: u32, start: u64, last: u64) -> Partition {
        Partition {
            disk: PathBuf::from(disk),
            number,
            start,
            last,
            lvm_flag: false,
            fstype: None,
            in_use: false,
        }
    }

    #[test]
    fn msdos_geometry() {
        let table = PartTableKind::Msdos;
        assert_eq!(table.first_usable(), 32_256);
        assert_eq!(table.last_usable(DISK_100G), 107_374_182_399);
    }

    #[test]
    fn gpt_geometry() {
        let table = PartTableKind::Gpt;
        assert_eq!(table.first_usable(), 0x4400);
        assert_eq!(table.last_usable(DISK_100G), 107_374_165_503);
    }

    #[test]
    fn partition_device_naming() {
        assert_eq!(
            partition_device(Path::new("/dev/sda"), 2),
            PathBuf::from("/dev/sda2")
        );
        assert_eq!(
            partition_device(Path::new("/dev/loop0"), 1),
            PathBuf::from("/dev/loop0p1")
        );
        assert_eq!(
            partition_device(Path::new("/dev/nvme0n1"), 3),
            PathBuf::from("/dev/nvme0n1p3")
        );
    }

    #[test]
    fn free_space_around_middle_partition() {
        let disk = Disk {
            path: PathBuf::from("/dev/sdb"),
            size: DISK_100G,
            table: PartTableKind::Msdos,
            major: 8,
            minor: 16,
            partitions: vec![part("/dev/sdb", 1, 5 * GB, 6 * GB - 1)],
        };

        let free = disk.free_spaces();
        assert_eq!(free.len(), 2);
        assert_eq!((free[0].start, free[0].last), (32_256, 5 * GB - 1));
        assert_eq!((free[1].start, free[1].last), (6 * GB, DISK_100G - 1));
    }

    #[test]
    fn free_space_covers_usable_window_exactly() {
        // Partitions plus gaps must tile [first_usable, last_usable] with
        // no overlap.
        let disk = Disk {
            path: PathBuf::from("/dev/sdb"),
            size: DISK_100G,
            table: PartTableKind::Gpt,
            major: 8,
            minor: 16,
            partitions: vec![
                part("/dev/sdb", 1, 5 * GB, 6 * GB - 1),
                part("/dev/sdb", 2, 10 * GB, 11 * GB - 1),
            ],
        };

        let mut intervals: Vec<(u64, u64)> = disk
            .partitions
            .iter()
            .map(|p| (p.start, p.last))
            .chain(disk.free_spaces().iter().map(|f| (f.start, f.last)))
            .collect();
        intervals.sort();

        let first = disk.table.first_usable();
        let last = disk.table.last_usable(disk.size);
        assert_eq!(intervals.first().map(|i| i.0), Some(first));
        assert_eq!(intervals.last().map(|i| i.1), Some(last));
        for window in intervals.windows(2) {
            assert_eq!(window[0].1 + 1, window[1].0, "gap or overlap in tiling");
        }
    }

    #[test]
    fn tiny_gaps_are_ignored() {
        let disk = Disk {
            path: PathBuf::from("/dev/sdb"),
            size: DISK_100G,
            table: PartTableKind::Msdos,
            major: 8,
            minor: 16,
            // Partition starts half a MiB past first_usable.
            partitions: vec![part("/dev/sdb", 1, 32_256 + 512 * 1024, DISK_100G - 1)],
        };

        assert!(disk.free_spaces().is_empty());
    }

    #[test]
    fn whole_disk_has_no_free_space() {
        let disk = Disk {
            path: PathBuf::from("/dev/sdc"),
            size: DISK_100G,
            table: PartTableKind::None,
            major: 8,
            minor: 32,
            partitions: Vec::new(),
        };
        assert!(disk.free_spaces().is_empty());
    }
}
