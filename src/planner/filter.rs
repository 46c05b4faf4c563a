//! Source admissibility filter.
//!
//! A comma-separated token list selects which free-space sources the
//! planner may absorb. Tokens combine as a union; `none` wins over
//! everything.

use crate::errors::FilterSyntaxError;
use crate::graph::StorageGraph;
use crate::planner::Source;

pub const FILTER_LVM_ALREADY_PLACED: &str = "lvm-already-placed";
pub const FILTER_SAME_DISK: &str = "same-disk";
pub const FILTER_ALL_DISKS: &str = "all-disks";
pub const FILTER_NONE: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    lvm_already_placed: bool,
    same_disk: bool,
    all_disks: bool,
    none: bool,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            lvm_already_placed: true,
            same_disk: false,
            all_disks: false,
            none: false,
        }
    }
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Self, FilterSyntaxError> {
        let mut filter = Self {
            lvm_already_placed: false,
            same_disk: false,
            all_disks: false,
            none: false,
        };

        for token in expr.split(',') {
            match token.trim() {
                FILTER_LVM_ALREADY_PLACED => filter.lvm_already_placed = true,
                FILTER_SAME_DISK => filter.same_disk = true,
                FILTER_ALL_DISKS => filter.all_disks = true,
                FILTER_NONE => filter.none = true,
                unknown => return Err(FilterSyntaxError(unknown.to_string())),
            }
        }

        Ok(filter)
    }

    /// `none` was requested: the caller asked for no disk sources at all.
    pub fn is_none(&self) -> bool {
        self.none
    }

    pub fn admits(&self, graph: &StorageGraph, source: &Source) -> bool {
        if self.none {
            return false;
        }
        if self.all_disks {
            return true;
        }
        if self.same_disk && graph.target_disks().contains(source.disk()) {
            return true;
        }
        if self.lvm_already_placed {
            if graph.lv.is_some() {
                // Only disks that already contribute a PV to the target VG.
                if graph.vg_disks().contains(source.disk()) {
                    return true;
                }
            } else if let Some(part) = &graph.target_partition
                && let Source::Gap(gap) = source
                && gap.disk == part.disk
                && gap.start == part.last + 1
            {
                // Direct tail extension of the target partition itself.
                return true;
            }
        }
        false
    }
}
