//! Shared test support: a scripted command runner and the probe command
//! lines it answers.

use fsextend::errors::ProbeError;
use fsextend::runner::{CommandOutput, CommandRunner, shell_join};
use std::cell::RefCell;
use std::collections::HashMap;

pub const GB: u64 = 1024 * 1024 * 1024;

pub const LSBLK_CMD: &str =
    "lsblk -J -b -o NAME,KNAME,PATH,MAJ:MIN,TYPE,SIZE,PKNAME,FSTYPE,MOUNTPOINT";
pub const PVS_CMD: &str = "pvs --noheadings --units b --nosuffix --separator '|' -o pv_name,vg_name,pv_size,pv_free,dev_size,pe_start";
pub const VGS_CMD: &str = "vgs --noheadings --units b --nosuffix --separator '|' -o vg_name,vg_extent_size,vg_extent_count,vg_free_count,vg_free";
pub const LVS_CMD: &str = "lvs --noheadings --units b --nosuffix --separator '|' -o lv_name,vg_name,lv_path,lv_size,lv_kernel_major,lv_kernel_minor";

pub fn lsblk_disk_cmd(disk: &str) -> String {
    format!("{LSBLK_CMD} {disk}")
}

pub fn parted_print_cmd(disk: &str) -> String {
    format!("parted -s {disk} unit b print")
}

/// Maps full command lines to canned replies and records every call.
/// Unscripted commands fail with status 1, like a refusing utility.
#[derive(Default)]
pub struct MockRunner {
    replies: RefCell<HashMap<String, CommandOutput>>,
    calls: RefCell<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, line: impl Into<String>, stdout: &str) {
        self.replies.borrow_mut().insert(
            line.into(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                status: 0,
            },
        );
    }

    pub fn script_fail(&self, line: impl Into<String>, stderr: &str) {
        self.replies.borrow_mut().insert(
            line.into(),
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                status: 1,
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProbeError> {
        let line = shell_join(program, args);
        self.calls.borrow_mut().push(line.clone());
        Ok(self
            .replies
            .borrow()
            .get(&line)
            .cloned()
            .unwrap_or(CommandOutput {
                stdout: String::new(),
                stderr: format!("not scripted: {line}"),
                status: 1,
            }))
    }
}
