//! Storage graph construction.
//!
//! Walks upward from a mount point: mount → filesystem → (partition | LV →
//! VG → PVs → partitions) → disks, then computes every disk's free-space
//! intervals. The result is the immutable input of the planner.

use crate::errors::{GraphResolveError, ProbeError};
use crate::model::{
    Disk, Filesystem, FreeSpace, FsKind, LogicalVolume, Mount, PartTableKind, Partition,
    PhysicalVolume, VolumeGroup, partition_device,
};
use crate::probe::lsblk::{DeviceTree, LsblkDevice};
use crate::probe::lvm::{LvRecord, PvRecord, VgRecord};
use crate::probe::{fs as fsprobe, lsblk, lvm, mounts, parted};
use crate::runner::CommandRunner;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// The transitive support-closure of the target mount, plus every disk on
/// the host (other disks may be admissible free-space sources).
#[derive(Debug)]
pub struct StorageGraph {
    pub mount: Mount,
    pub fs: Filesystem,
    /// Set when the filesystem sits directly on a partition.
    pub target_partition: Option<Partition>,
    pub lv: Option<LogicalVolume>,
    pub vg: Option<VolumeGroup>,
    /// PVs of the target VG.
    pub pvs: Vec<PhysicalVolume>,
    /// Every PV on the host, any VG or none.
    pub all_pvs: Vec<PhysicalVolume>,
    /// Sorted by path.
    pub disks: Vec<Disk>,
    /// Disk order, then start order.
    pub free: Vec<FreeSpace>,
}

impl StorageGraph {
    pub fn disk(&self, path: &Path) -> Option<&Disk> {
        self.disks.iter().find(|d| d.path == path)
    }

    /// Disks hosting a PV of the target VG.
    pub fn vg_disks(&self) -> BTreeSet<PathBuf> {
        let mut disks = BTreeSet::new();
        for pv in &self.pvs {
            if let Some(disk) = self.disk_of_device(&pv.device) {
                disks.insert(disk.path.clone());
            }
        }
        disks
    }

    /// Disks supporting any layer of the target stack.
    pub fn target_disks(&self) -> BTreeSet<PathBuf> {
        let mut disks = self.vg_disks();
        if let Some(part) = &self.target_partition {
            disks.insert(part.disk.clone());
        }
        disks
    }

    /// The partition backing a target-VG PV whose last byte is `last`.
    pub fn pv_partition_ending_at(&self, disk: &Path, last: u64) -> Option<&Partition> {
        let disk = self.disk(disk)?;
        disk.partitions.iter().find(|p| {
            p.last == last
                && self
                    .pvs
                    .iter()
                    .any(|pv| pv.device == p.device())
        })
    }

    pub fn pv_for_device(&self, device: &Path) -> Option<&PhysicalVolume> {
        self.all_pvs.iter().find(|pv| pv.device == device)
    }

    fn disk_of_device(&self, device: &Path) -> Option<&Disk> {
        // A PV device is either a partition node or the whole disk.
        self.disks.iter().find(|disk| {
            disk.path == device
                || disk
                    .partitions
                    .iter()
                    .any(|p| p.device() == device)
        })
    }
}

/// Per-run resolver over the probed device tree.
///
/// Caches major:minor and path lookups so repeated classifications don't
/// re-walk (or re-probe) the tree.
struct DeviceIndex {
    nodes: Vec<LsblkDevice>,
    majmin: HashMap<(u32, u32), usize>,
    paths: HashMap<String, usize>,
}

impl DeviceIndex {
    fn build(tree: &DeviceTree) -> Result<Self, ProbeError> {
        let nodes: Vec<LsblkDevice> = tree.flatten().into_iter().cloned().collect();
        let mut majmin = HashMap::new();
        let mut paths = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            majmin.insert(node.major_minor()?, i);
            paths.insert(node.device_path(), i);
        }
        Ok(Self {
            nodes,
            majmin,
            paths,
        })
    }

    fn by_major_minor(&self, key: (u32, u32)) -> Option<&LsblkDevice> {
        self.majmin.get(&key).map(|&i| &self.nodes[i])
    }

    fn by_path(&self, path: &str) -> Option<&LsblkDevice> {
        self.paths.get(path).map(|&i| &self.nodes[i])
    }
}

/// Strip trailing slashes, keeping `/` itself.
pub fn normalize_mount_point(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}

pub fn build(
    runner: &dyn CommandRunner,
    mount_point: &Path,
) -> Result<StorageGraph, GraphResolveError> {
    let point = normalize_mount_point(mount_point);

    let mount_table = mounts::list_mounts(runner)?;
    let mount = mount_table
        .into_iter()
        .find(|m| m.point == point)
        .ok_or_else(|| GraphResolveError::MountNotFound(point.clone()))?;

    let tree = lsblk::device_tree(runner)?;
    let index = DeviceIndex::build(&tree)?;

    let point_str = point.to_string_lossy().into_owned();
    let device_str = mount.device.to_string_lossy().into_owned();
    let target = tree
        .find_by_mountpoint(&point_str)
        .or_else(|| index.by_path(&device_str))
        .ok_or_else(|| GraphResolveError::UnknownDevice(device_str.clone()))?;
    // lsblk repeats an LV under every PV that backs it; major:minor picks
    // one canonical node.
    let target = index
        .by_major_minor(target.major_minor()?)
        .unwrap_or(target);

    // LVM reports; tolerate hosts without the tools, but never malformed
    // output.
    let pv_records = tolerate_missing(lvm::list_pvs(runner))?;
    let vg_records = tolerate_missing(lvm::list_vgs(runner))?;
    let lv_records = tolerate_missing(lvm::list_lvs(runner))?;

    let disks = build_disks(runner, &tree, &index, &pv_records)?;

    let (target_partition, lv, vg, pvs) = classify_target(
        target,
        &disks,
        &pv_records,
        &vg_records,
        &lv_records,
    )?;

    let fstype = target
        .fstype
        .clone()
        .unwrap_or_else(|| mount.fstype.clone());
    let kind = FsKind::from_name(&fstype);
    let fs_device = PathBuf::from(target.device_path());
    let fs_size = fsprobe::fs_info(runner, &kind, &fs_device, &point)?;
    let fs = Filesystem {
        kind,
        device: fs_device,
        size: fs_size,
    };

    let free = disks.iter().flat_map(Disk::free_spaces).collect();

    Ok(StorageGraph {
        mount: Mount {
            point,
            device: mount.device,
            fstype: mount.fstype,
        },
        fs,
        target_partition,
        lv,
        vg,
        pvs,
        all_pvs: pv_records.iter().map(pv_from_record).collect(),
        disks,
        free,
    })
}

fn tolerate_missing<T>(result: Result<Vec<T>, ProbeError>) -> Result<Vec<T>, ProbeError> {
    match result {
        Ok(records) => Ok(records),
        Err(ProbeError::Run { .. }) | Err(ProbeError::Failed { .. }) => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

fn pv_from_record(record: &PvRecord) -> PhysicalVolume {
    PhysicalVolume {
        device: PathBuf::from(&record.pv_name),
        vg: record.vg_name.clone(),
        pv_size: record.pv_size,
        pv_free: record.pv_free,
        dev_size: record.dev_size,
        pe_start: record.pe_start,
    }
}

fn build_disks(
    runner: &dyn CommandRunner,
    tree: &DeviceTree,
    index: &DeviceIndex,
    pv_records: &[PvRecord],
) -> Result<Vec<Disk>, GraphResolveError> {
    let mut disks = Vec::new();

    for node in &tree.devices {
        if node.kind != "disk" && node.kind != "loop" {
            continue;
        }
        let path = node.device_path();
        let (major, minor) = node.major_minor()?;

        let report = match parted::read_partitions(runner, &path) {
            Ok(report) => report,
            // No readable label (blank disk, busy medium): nothing to plan
            // there, but the disk still appears in the graph.
            Err(ProbeError::Failed { .. }) => {
                disks.push(Disk {
                    path: PathBuf::from(&path),
                    size: node.size,
                    table: PartTableKind::None,
                    major,
                    minor,
                    partitions: Vec::new(),
                });
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let disk_path = PathBuf::from(&path);
        let partitions = report
            .partitions
            .iter()
            .map(|p| {
                let device = partition_device(&disk_path, p.number);
                let device_str = device.to_string_lossy().into_owned();
                let node = index.by_path(&device_str);
                let mounted = node.is_some_and(|n| n.mountpoint.is_some());
                let held = node.is_some_and(|n| !n.children.is_empty());
                let active_pv = pv_records
                    .iter()
                    .any(|pv| pv.pv_name == device_str && pv.vg_name.is_some());
                Partition {
                    disk: disk_path.clone(),
                    number: p.number,
                    start: p.start,
                    last: p.last,
                    lvm_flag: p.lvm_flag,
                    fstype: node.and_then(|n| n.fstype.clone()),
                    in_use: mounted || held || active_pv,
                }
            })
            .collect();

        disks.push(Disk {
            path: disk_path,
            size: report.size,
            table: report.table,
            major,
            minor,
            partitions,
        });
    }

    disks.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(disks)
}

fn classify_target(
    target: &LsblkDevice,
    disks: &[Disk],
    pv_records: &[PvRecord],
    vg_records: &[VgRecord],
    lv_records: &[LvRecord],
) -> Result<
    (
        Option<Partition>,
        Option<LogicalVolume>,
        Option<VolumeGroup>,
        Vec<PhysicalVolume>,
    ),
    GraphResolveError,
> {
    match target.kind.as_str() {
        "part" => {
            let device = target.device_path();
            let partition = disks
                .iter()
                .flat_map(|d| d.partitions.iter())
                .find(|p| p.device().to_string_lossy() == device.as_str())
                .cloned()
                .ok_or_else(|| GraphResolveError::UnknownDevice(device))?;
            Ok((Some(partition), None, None, Vec::new()))
        }
        "lvm" => {
            let (major, minor) = target.major_minor()?;
            let lv_record = lv_records
                .iter()
                .find(|lv| lv.kernel_major == i64::from(major) && lv.kernel_minor == i64::from(minor))
                .ok_or(GraphResolveError::LvNotFound { major, minor })?;
            let vg_record = vg_records
                .iter()
                .find(|vg| vg.vg_name == lv_record.vg_name)
                .ok_or_else(|| GraphResolveError::VgNotFound(lv_record.vg_name.clone()))?;

            let lv = LogicalVolume {
                name: lv_record.lv_name.clone(),
                vg: lv_record.vg_name.clone(),
                path: PathBuf::from(&lv_record.lv_path),
                size: lv_record.lv_size,
                major,
                minor,
            };
            let vg = VolumeGroup {
                name: vg_record.vg_name.clone(),
                extent_size: vg_record.extent_size,
                extent_count: vg_record.extent_count,
                free_extents: vg_record.free_count,
                free_bytes: vg_record.vg_free,
            };
            let pvs = pv_records
                .iter()
                .filter(|pv| pv.vg_name.as_deref() == Some(vg_record.vg_name.as_str()))
                .map(pv_from_record)
                .collect();

            Ok((None, Some(lv), Some(vg), pvs))
        }
        // A filesystem directly on the whole disk: nothing below it to
        // extend, only the filesystem itself.
        "disk" | "loop" => Ok((None, None, None, Vec::new())),
        other => Err(GraphResolveError::UnknownDevice(format!(
            "{} ({other})",
            target.device_path()
        ))),
    }
}
