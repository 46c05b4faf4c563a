//! Growth planning.
//!
//! Takes the immutable storage graph, selects admissible free-space
//! sources, and emits the ordered step list that fills every layer between
//! the target mount and its disks. Reasoning runs top-down (mount → fs →
//! lv → vg → pv → partition → disk); steps come out bottom-up.

pub mod filter;
pub mod steps;

pub use filter::{
    FILTER_ALL_DISKS, FILTER_LVM_ALREADY_PLACED, FILTER_NONE, FILTER_SAME_DISK, Filter,
};
pub use steps::PlanStep;

use crate::errors::PlanError;
use crate::graph::StorageGraph;
use crate::model::{Disk, FreeSpace, MIN_FREE_BYTES, PartTableKind};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Ordered, idempotent command plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// One shell-level line per command, in execution order.
    pub fn render(&self) -> Vec<String> {
        self.steps.iter().flat_map(|s| s.render()).collect()
    }
}

/// Planning failed; `partial` holds the steps produced before the failure
/// so a dry run can still show them.
#[derive(Debug)]
pub struct PlanFailure {
    pub partial: Plan,
    pub error: PlanError,
}

impl fmt::Display for PlanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for PlanFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A candidate byte range the planner may absorb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Unpartitioned gap.
    Gap(FreeSpace),
    /// An existing `lvm`-flagged partition that belongs to no volume
    /// group and carries no foreign data. Typically one this tool created
    /// before a reboot.
    LvmPartition {
        disk: PathBuf,
        device: PathBuf,
        start: u64,
        last: u64,
        /// Already `pvcreate`d (but never joined to a VG).
        is_pv: bool,
    },
}

impl Source {
    pub fn disk(&self) -> &Path {
        match self {
            Source::Gap(gap) => &gap.disk,
            Source::LvmPartition { disk, .. } => disk,
        }
    }

    pub fn start(&self) -> u64 {
        match self {
            Source::Gap(gap) => gap.start,
            Source::LvmPartition { start, .. } => *start,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Source::Gap(gap) => gap.len(),
            Source::LvmPartition { start, last, .. } => last - start + 1,
        }
    }
}

/// All candidate sources on all disks, disk order then start order.
pub fn enumerate_sources(graph: &StorageGraph) -> Vec<Source> {
    let mut sources = Vec::new();

    for disk in &graph.disks {
        let mut on_disk: Vec<Source> = disk.free_spaces().into_iter().map(Source::Gap).collect();

        for partition in &disk.partitions {
            if !partition.lvm_flag || partition.in_use {
                continue;
            }
            let device = partition.device();
            let is_member = partition.fstype.as_deref() == Some("LVM2_member");
            match graph.pv_for_device(&device) {
                // Belongs to some VG. The target's own PVs are in use and
                // were skipped above; anything else is another VG's
                // property and never admissible.
                Some(pv) if pv.vg.is_some() => continue,
                Some(_) => on_disk.push(Source::LvmPartition {
                    disk: disk.path.clone(),
                    device,
                    start: partition.start,
                    last: partition.last,
                    is_pv: true,
                }),
                None => {
                    // A filesystem signature means data we must not touch.
                    if partition.fstype.is_some() && !is_member {
                        continue;
                    }
                    on_disk.push(Source::LvmPartition {
                        disk: disk.path.clone(),
                        device,
                        start: partition.start,
                        last: partition.last,
                        is_pv: is_member,
                    });
                }
            }
        }

        on_disk.sort_by_key(Source::start);
        sources.extend(on_disk);
    }

    sources
}

/// Stable partition-number allocation: lowest positive number unused on
/// the disk, tracked per run so several new partitions on one disk stay
/// unique. parted's own assignment follows the same rule, which is what
/// keeps the numbers valid across a reboot.
struct PartitionNumbers {
    used: HashMap<(u32, u32), BTreeSet<u32>>,
}

impl PartitionNumbers {
    fn seed(disks: &[Disk]) -> Self {
        let mut used = HashMap::new();
        for disk in disks {
            used.insert(
                (disk.major, disk.minor),
                disk.partitions.iter().map(|p| p.number).collect::<BTreeSet<u32>>(),
            );
        }
        Self { used }
    }

    fn used_count(&self, disk: &Disk) -> usize {
        self.used
            .get(&(disk.major, disk.minor))
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    fn next(&mut self, disk: &Disk) -> u32 {
        let set = self.used.entry((disk.major, disk.minor)).or_default();
        let mut candidate = 1;
        while set.contains(&candidate) {
            candidate += 1;
        }
        set.insert(candidate);
        candidate
    }
}

struct StepBuckets {
    partitions: Vec<PlanStep>,
    pv_creates: Vec<PlanStep>,
    pv_resizes: BTreeSet<PathBuf>,
    vg_extends: Vec<PlanStep>,
    tail: Vec<PlanStep>,
}

impl StepBuckets {
    fn new() -> Self {
        Self {
            partitions: Vec::new(),
            pv_creates: Vec::new(),
            pv_resizes: BTreeSet::new(),
            vg_extends: Vec::new(),
            tail: Vec::new(),
        }
    }

    /// Bottom-up emission order: partition table edits, PV preparation,
    /// VG extension, then LV and filesystem growth.
    fn assemble(self) -> Plan {
        let mut steps = self.partitions;
        steps.extend(self.pv_creates);
        steps.extend(
            self.pv_resizes
                .into_iter()
                .map(|device| PlanStep::PvResize { device }),
        );
        steps.extend(self.vg_extends);
        steps.extend(self.tail);
        Plan { steps }
    }
}

pub fn plan(graph: &StorageGraph, filter: &Filter) -> Result<Plan, PlanFailure> {
    if !graph.fs.kind.growable() {
        return Err(PlanFailure {
            partial: Plan::default(),
            error: PlanError::UnsupportedFilesystem {
                kind: graph.fs.kind.name().to_string(),
            },
        });
    }

    let sources = enumerate_sources(graph);
    let admitted: Vec<&Source> = sources
        .iter()
        .filter(|s| filter.admits(graph, s))
        .collect();

    let mut buckets = StepBuckets::new();
    let mut alloc = PartitionNumbers::seed(&graph.disks);

    if let (Some(lv), Some(vg)) = (&graph.lv, &graph.vg) {
        let mut vg_gain: u64 = 0;

        for source in &admitted {
            let Some(disk) = graph.disk(source.disk()) else {
                continue;
            };
            let busy = disk.in_use();

            match source {
                Source::Gap(gap) => {
                    // Free space right behind a PV partition of the target
                    // VG extends that partition instead of creating a new
                    // one.
                    if let Some(part) = graph.pv_partition_ending_at(&gap.disk, gap.start - 1) {
                        buckets.partitions.push(PlanStep::ResizePartition {
                            disk: disk.path.clone(),
                            number: part.number,
                            start: part.start,
                            new_last: gap.last,
                            requires_reread: busy,
                        });
                        buckets.pv_resizes.insert(part.device());
                        vg_gain += gap.len();
                        continue;
                    }

                    if disk.table == PartTableKind::Msdos && alloc.used_count(disk) >= 4 {
                        return Err(PlanFailure {
                            partial: buckets.assemble(),
                            error: PlanError::PrimaryPartitionLimit {
                                disk: disk.path.clone(),
                            },
                        });
                    }

                    let number = alloc.next(disk);
                    let device = crate::model::partition_device(&disk.path, number);
                    buckets.partitions.push(PlanStep::CreatePartition {
                        disk: disk.path.clone(),
                        number,
                        start: gap.start,
                        last: gap.last,
                        lvm: true,
                        requires_reread: busy,
                    });
                    buckets.pv_creates.push(PlanStep::PvCreate {
                        device: device.clone(),
                    });
                    buckets.vg_extends.push(PlanStep::VgExtend {
                        vg: vg.name.clone(),
                        device,
                    });
                    vg_gain += gap.len();
                }
                Source::LvmPartition { device, is_pv, .. } => {
                    if !is_pv {
                        buckets.pv_creates.push(PlanStep::PvCreate {
                            device: device.clone(),
                        });
                    }
                    buckets.vg_extends.push(PlanStep::VgExtend {
                        vg: vg.name.clone(),
                        device: device.clone(),
                    });
                    vg_gain += source.len();
                }
            }
        }

        // PVs whose backing device outgrew them (a partition extended just
        // before a reboot) catch up with pvresize.
        for pv in &graph.pvs {
            if buckets.pv_resizes.contains(&pv.device) {
                continue;
            }
            if pv.lagging_bytes() >= vg.extent_size {
                buckets.pv_resizes.insert(pv.device.clone());
                vg_gain += pv.lagging_bytes();
            }
        }

        let lv_grows = vg.free_bytes + vg_gain >= vg.extent_size;
        if lv_grows {
            buckets.tail.push(PlanStep::LvExtend {
                lv_path: lv.path.clone(),
            });
        }

        let fs_lags = matches!(graph.fs.size, Some(size) if size + MIN_FREE_BYTES <= lv.size);
        if lv_grows || fs_lags {
            buckets.tail.push(fs_grow(graph));
        }
    } else if let Some(part) = &graph.target_partition {
        // No LVM below the filesystem: the only admissible growth is the
        // tail of the target partition itself. Everything else has no
        // volume group to flow into and is ignored.
        let mut growth: u64 = 0;
        for source in &admitted {
            if let Source::Gap(gap) = source
                && gap.disk == part.disk
                && gap.start == part.last + 1
            {
                let busy = graph.disk(&part.disk).is_some_and(Disk::in_use);
                buckets.partitions.push(PlanStep::ResizePartition {
                    disk: part.disk.clone(),
                    number: part.number,
                    start: part.start,
                    new_last: gap.last,
                    requires_reread: busy,
                });
                growth = gap.last - part.last;
                break;
            }
        }

        let device_after = part.size() + growth;
        let fs_lags =
            matches!(graph.fs.size, Some(size) if size + MIN_FREE_BYTES <= device_after);
        if growth > 0 || fs_lags {
            buckets.tail.push(fs_grow(graph));
        }
    } else {
        // Filesystem directly on a whole disk: nothing below it to extend.
        let device_size = graph.disk(&graph.fs.device).map(|d| d.size);
        let fs_lags = matches!((graph.fs.size, device_size),
            (Some(size), Some(device)) if size + MIN_FREE_BYTES <= device);
        if fs_lags {
            buckets.tail.push(fs_grow(graph));
        }
    }

    let plan = buckets.assemble();

    // An LVM target with free space on disks the filter refuses, and
    // nothing else to do, is a hard refusal rather than a silent no-op.
    if plan.is_empty()
        && graph.lv.is_some()
        && admitted.is_empty()
        && !sources.is_empty()
        && !filter.is_none()
    {
        return Err(PlanFailure {
            partial: plan,
            error: PlanError::NoAdmissibleSources,
        });
    }

    Ok(plan)
}

fn fs_grow(graph: &StorageGraph) -> PlanStep {
    PlanStep::FsGrow {
        kind: graph.fs.kind.clone(),
        device: graph.fs.device.clone(),
        mount_point: graph.mount.point.clone(),
    }
}
