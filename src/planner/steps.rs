//! Typed plan steps and their shell-level rendering.
//!
//! Steps carry stable identifiers (disk path + partition number, VG name,
//! LV path) rather than graph references, so an emitted step stays
//! meaningful after a reboot and re-probe.

use crate::model::{FsKind, partition_device};
use crate::runner::shell_join;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// `parted mkpart` (plus `set N lvm on` when the partition will back a
    /// PV). parted assigns the lowest free slot itself; `number` mirrors
    /// that choice so the flag lands on the right partition.
    CreatePartition {
        disk: PathBuf,
        number: u32,
        start: u64,
        last: u64,
        lvm: bool,
        requires_reread: bool,
    },
    /// Extend an existing partition's tail to `new_last`. `start` is kept
    /// so the executor can check the kernel adopted the new geometry.
    ResizePartition {
        disk: PathBuf,
        number: u32,
        start: u64,
        new_last: u64,
        requires_reread: bool,
    },
    PvCreate {
        device: PathBuf,
    },
    PvResize {
        device: PathBuf,
    },
    VgExtend {
        vg: String,
        device: PathBuf,
    },
    LvExtend {
        lv_path: PathBuf,
    },
    FsGrow {
        kind: FsKind,
        device: PathBuf,
        mount_point: PathBuf,
    },
}

impl PlanStep {
    /// True when the step rewrites a partition table the running kernel
    /// may refuse to re-read.
    pub fn requires_reread(&self) -> bool {
        match self {
            PlanStep::CreatePartition {
                requires_reread, ..
            }
            | PlanStep::ResizePartition {
                requires_reread, ..
            } => *requires_reread,
            _ => false,
        }
    }

    /// The disk whose table the step edits, if any.
    pub fn disk(&self) -> Option<&Path> {
        match self {
            PlanStep::CreatePartition { disk, .. } | PlanStep::ResizePartition { disk, .. } => {
                Some(disk)
            }
            _ => None,
        }
    }

    /// Device node and exact byte size the kernel must report once it has
    /// adopted the step's partition-table change.
    pub fn expected_device(&self) -> Option<(PathBuf, u64)> {
        match self {
            PlanStep::CreatePartition {
                disk,
                number,
                start,
                last,
                ..
            } => Some((partition_device(disk, *number), last - start + 1)),
            PlanStep::ResizePartition {
                disk,
                number,
                start,
                new_last,
                ..
            } => Some((partition_device(disk, *number), new_last - start + 1)),
            _ => None,
        }
    }

    /// The argv vectors the executor runs for this step, in order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        fn argv(parts: &[&str]) -> Vec<String> {
            parts.iter().map(|s| s.to_string()).collect()
        }

        match self {
            PlanStep::CreatePartition {
                disk,
                number,
                start,
                last,
                lvm,
                ..
            } => {
                let disk = disk.to_string_lossy();
                let mut commands = vec![argv(&[
                    "parted",
                    "-s",
                    &disk,
                    "unit",
                    "b",
                    "mkpart",
                    "primary",
                    &start.to_string(),
                    &last.to_string(),
                ])];
                if *lvm {
                    commands.push(argv(&[
                        "parted",
                        "-s",
                        &disk,
                        "set",
                        &number.to_string(),
                        "lvm",
                        "on",
                    ]));
                }
                commands
            }
            PlanStep::ResizePartition {
                disk,
                number,
                new_last,
                ..
            } => vec![argv(&[
                "parted",
                "-s",
                &disk.to_string_lossy(),
                "unit",
                "b",
                "resizepart",
                &number.to_string(),
                &new_last.to_string(),
            ])],
            PlanStep::PvCreate { device } => {
                vec![argv(&["pvcreate", &device.to_string_lossy()])]
            }
            PlanStep::PvResize { device } => {
                vec![argv(&["pvresize", &device.to_string_lossy()])]
            }
            PlanStep::VgExtend { vg, device } => {
                vec![argv(&["vgextend", vg, &device.to_string_lossy()])]
            }
            PlanStep::LvExtend { lv_path } => vec![argv(&[
                "lvextend",
                "-l",
                "+100%FREE",
                &lv_path.to_string_lossy(),
            ])],
            PlanStep::FsGrow {
                kind,
                device,
                mount_point,
            } => {
                if kind.is_ext() {
                    vec![argv(&["resize2fs", &device.to_string_lossy()])]
                } else {
                    vec![argv(&["xfs_growfs", &mount_point.to_string_lossy()])]
                }
            }
        }
    }

    /// Shell-level command lines, one per invocation.
    pub fn render(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|argv| {
                let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
                shell_join(&argv[0], &args)
            })
            .collect()
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render().join(" && "))
    }
}
