//! Device tree parsing from `lsblk -J -b`.

use crate::errors::ProbeError;
use crate::probe::run_ok;
use crate::runner::CommandRunner;
use serde::{Deserialize, Deserializer};

const LSBLK_COLUMNS: &str = "NAME,KNAME,PATH,MAJ:MIN,TYPE,SIZE,PKNAME,FSTYPE,MOUNTPOINT";

#[derive(Debug, Deserialize)]
pub struct LsblkReport {
    pub blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LsblkDevice {
    pub name: String,
    pub kname: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(rename = "maj:min")]
    pub maj_min: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub size: u64,
    #[serde(default)]
    pub pkname: Option<String>,
    #[serde(default)]
    pub fstype: Option<String>,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub children: Vec<LsblkDevice>,
}

/// Older util-linux emits `-b` sizes as JSON strings.
fn u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl LsblkDevice {
    /// Canonical device node path.
    pub fn device_path(&self) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None => format!("/dev/{}", self.kname),
        }
    }

    /// `maj:min` split into numbers.
    pub fn major_minor(&self) -> Result<(u32, u32), ProbeError> {
        let (major, minor) = self
            .maj_min
            .trim()
            .split_once(':')
            .ok_or_else(|| ProbeError::parse("lsblk", &self.maj_min))?;
        let major = major
            .parse()
            .map_err(|_| ProbeError::parse("lsblk", &self.maj_min))?;
        let minor = minor
            .parse()
            .map_err(|_| ProbeError::parse("lsblk", &self.maj_min))?;
        Ok((major, minor))
    }
}

#[derive(Debug)]
pub struct DeviceTree {
    pub devices: Vec<LsblkDevice>,
}

impl DeviceTree {
    /// Depth-first flattening of the tree.
    pub fn flatten(&self) -> Vec<&LsblkDevice> {
        fn walk<'a>(nodes: &'a [LsblkDevice], out: &mut Vec<&'a LsblkDevice>) {
            for node in nodes {
                out.push(node);
                walk(&node.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.devices, &mut out);
        out
    }

    pub fn find_by_mountpoint(&self, point: &str) -> Option<&LsblkDevice> {
        self.flatten()
            .into_iter()
            .find(|node| node.mountpoint.as_deref() == Some(point))
    }

    pub fn find_by_path(&self, device: &str) -> Option<&LsblkDevice> {
        self.flatten()
            .into_iter()
            .find(|node| node.device_path() == device)
    }
}

pub fn parse_device_tree(json: &str) -> Result<DeviceTree, ProbeError> {
    let report: LsblkReport = serde_json::from_str(json).map_err(|e| ProbeError::Parse {
        utility: "lsblk".to_string(),
        snippet: e.to_string(),
    })?;
    Ok(DeviceTree {
        devices: report.blockdevices,
    })
}

/// Full device tree of the host.
pub fn device_tree(runner: &dyn CommandRunner) -> Result<DeviceTree, ProbeError> {
    let output = run_ok(runner, "lsblk", &["-J", "-b", "-o", LSBLK_COLUMNS])?;
    parse_device_tree(&output)
}

/// Device tree below one disk only, used by the executor to check whether
/// the kernel has adopted a partition-table change.
pub fn disk_tree(runner: &dyn CommandRunner, disk: &str) -> Result<DeviceTree, ProbeError> {
    let output = run_ok(runner, "lsblk", &["-J", "-b", "-o", LSBLK_COLUMNS, disk])?;
    parse_device_tree(&output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
  "blockdevices": [
    {
      "name": "sda", "kname": "sda", "path": "/dev/sda", "maj:min": "8:0",
      "type": "disk", "size": 107374182400, "pkname": null,
      "fstype": null, "mountpoint": null,
      "children": [
        {
          "name": "sda1", "kname": "sda1", "path": "/dev/sda1", "maj:min": "8:1",
          "type": "part", "size": 1073741824, "pkname": "sda",
          "fstype": "LVM2_member", "mountpoint": null,
          "children": [
            {
              "name": "vg0-root", "kname": "dm-0", "path": "/dev/mapper/vg0-root",
              "maj:min": "253:0", "type": "lvm", "size": 524288000,
              "pkname": "sda1", "fstype": "xfs", "mountpoint": "/srv/data"
            }
          ]
        }
      ]
    }
  ]
}"#;

    #[test]
    fn parses_nested_devices() {
        let tree = parse_device_tree(FIXTURE).unwrap();
        let flat = tree.flatten();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].kind, "disk");
        assert_eq!(flat[1].fstype.as_deref(), Some("LVM2_member"));
        assert_eq!(flat[2].major_minor().unwrap(), (253, 0));
    }

    #[test]
    fn finds_by_mountpoint_and_path() {
        let tree = parse_device_tree(FIXTURE).unwrap();
        let lv = tree.find_by_mountpoint("/srv/data").unwrap();
        assert_eq!(lv.device_path(), "/dev/mapper/vg0-root");
        assert_eq!(tree.find_by_path("/dev/sda1").unwrap().kind, "part");
        assert!(tree.find_by_mountpoint("/nowhere").is_none());
    }

    #[test]
    fn sizes_may_be_strings() {
        let json = r#"{"blockdevices": [{"name": "sdb", "kname": "sdb",
            "maj:min": "8:16", "type": "disk", "size": "1000000",
            "mountpoint": null}]}"#;
        let tree = parse_device_tree(json).unwrap();
        assert_eq!(tree.devices[0].size, 1_000_000);
        assert_eq!(tree.devices[0].device_path(), "/dev/sdb");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_device_tree("not json").unwrap_err(),
            ProbeError::Parse { .. }
        ));
    }
}
