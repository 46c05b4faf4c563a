//! LVM report parsing (`pvs`, `vgs`, `lvs`).
//!
//! All three are invoked with `--noheadings --units b --nosuffix` and a
//! pipe separator, which gives one record per line with byte-exact sizes.

use crate::errors::ProbeError;
use crate::probe::{parse_bytes, run_ok};
use crate::runner::CommandRunner;

const REPORT_ARGS: [&str; 6] = [
    "--noheadings",
    "--units",
    "b",
    "--nosuffix",
    "--separator",
    "|",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvRecord {
    pub pv_name: String,
    /// None for a PV not assigned to any volume group.
    pub vg_name: Option<String>,
    pub pv_size: u64,
    pub pv_free: u64,
    pub dev_size: u64,
    pub pe_start: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgRecord {
    pub vg_name: String,
    pub extent_size: u64,
    pub extent_count: u64,
    pub free_count: u64,
    pub vg_free: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvRecord {
    pub lv_name: String,
    pub vg_name: String,
    pub lv_path: String,
    pub lv_size: u64,
    /// Negative when the LV has no active kernel device.
    pub kernel_major: i64,
    pub kernel_minor: i64,
}

fn fields(utility: &str, line: &str, expect: usize) -> Result<Vec<String>, ProbeError> {
    let fields: Vec<String> = line.trim().split('|').map(|f| f.trim().to_string()).collect();
    if fields.len() != expect {
        return Err(ProbeError::parse(utility, line.trim()));
    }
    Ok(fields)
}

fn parse_int(utility: &str, token: &str) -> Result<i64, ProbeError> {
    token
        .trim()
        .parse()
        .map_err(|_| ProbeError::parse(utility, token.trim()))
}

pub fn parse_pvs(output: &str) -> Result<Vec<PvRecord>, ProbeError> {
    let mut records = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let f = fields("pvs", line, 6)?;
        records.push(PvRecord {
            pv_name: f[0].clone(),
            vg_name: (!f[1].is_empty()).then(|| f[1].clone()),
            pv_size: parse_bytes("pvs", &f[2])?,
            pv_free: parse_bytes("pvs", &f[3])?,
            dev_size: parse_bytes("pvs", &f[4])?,
            pe_start: parse_bytes("pvs", &f[5])?,
        });
    }
    Ok(records)
}

pub fn parse_vgs(output: &str) -> Result<Vec<VgRecord>, ProbeError> {
    let mut records = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let f = fields("vgs", line, 5)?;
        records.push(VgRecord {
            vg_name: f[0].clone(),
            extent_size: parse_bytes("vgs", &f[1])?,
            extent_count: parse_bytes("vgs", &f[2])?,
            free_count: parse_bytes("vgs", &f[3])?,
            vg_free: parse_bytes("vgs", &f[4])?,
        });
    }
    Ok(records)
}

pub fn parse_lvs(output: &str) -> Result<Vec<LvRecord>, ProbeError> {
    let mut records = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let f = fields("lvs", line, 6)?;
        records.push(LvRecord {
            lv_name: f[0].clone(),
            vg_name: f[1].clone(),
            lv_path: f[2].clone(),
            lv_size: parse_bytes("lvs", &f[3])?,
            kernel_major: parse_int("lvs", &f[4])?,
            kernel_minor: parse_int("lvs", &f[5])?,
        });
    }
    Ok(records)
}

pub fn list_pvs(runner: &dyn CommandRunner) -> Result<Vec<PvRecord>, ProbeError> {
    let mut args: Vec<&str> = REPORT_ARGS.to_vec();
    args.extend_from_slice(&["-o", "pv_name,vg_name,pv_size,pv_free,dev_size,pe_start"]);
    let output = run_ok(runner, "pvs", &args)?;
    parse_pvs(&output)
}

pub fn list_vgs(runner: &dyn CommandRunner) -> Result<Vec<VgRecord>, ProbeError> {
    let mut args: Vec<&str> = REPORT_ARGS.to_vec();
    args.extend_from_slice(&["-o", "vg_name,vg_extent_size,vg_extent_count,vg_free_count,vg_free"]);
    let output = run_ok(runner, "vgs", &args)?;
    parse_vgs(&output)
}

pub fn list_lvs(runner: &dyn CommandRunner) -> Result<Vec<LvRecord>, ProbeError> {
    let mut args: Vec<&str> = REPORT_ARGS.to_vec();
    args.extend_from_slice(&[
        "-o",
        "lv_name,vg_name,lv_path,lv_size,lv_kernel_major,lv_kernel_minor",
    ]);
    let output = run_ok(runner, "lvs", &args)?;
    parse_lvs(&output)
}
