//! Mount table parsing.

use crate::errors::ProbeError;
use crate::model::Mount;
use crate::probe::run_ok;
use crate::runner::CommandRunner;
use std::path::PathBuf;

/// One line of `mount` output: `<device> on <point> type <fstype> (<opts>)`.
pub fn parse_mount_table(output: &str) -> Result<Vec<Mount>, ProbeError> {
    let mut mounts = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (device, rest) = line
            .split_once(" on ")
            .ok_or_else(|| ProbeError::parse("mount", line))?;
        // Mount points may contain spaces; the type clause is the last one.
        let (point, rest) = rest
            .rsplit_once(" type ")
            .ok_or_else(|| ProbeError::parse("mount", line))?;
        let fstype = rest.split_whitespace().next().unwrap_or_default();

        mounts.push(Mount {
            point: PathBuf::from(point),
            device: PathBuf::from(device),
            fstype: fstype.to_string(),
        });
    }

    Ok(mounts)
}

pub fn list_mounts(runner: &dyn CommandRunner) -> Result<Vec<Mount>, ProbeError> {
    let output = run_ok(runner, "mount", &[])?;
    parse_mount_table(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const FIXTURE: &str = "\
proc on /proc type proc (rw,nosuid,nodev,noexec,relatime)
/dev/sda2 on / type ext4 (rw,relatime)
/dev/mapper/vg0-data on /srv/data type xfs (rw,relatime,attr2)
tmpfs on /tmp type tmpfs (rw,nosuid,nodev)
";

    #[test]
    fn parses_devices_points_and_types() {
        let mounts = parse_mount_table(FIXTURE).unwrap();
        assert_eq!(mounts.len(), 4);

        let root = &mounts[1];
        assert_eq!(root.device, Path::new("/dev/sda2"));
        assert_eq!(root.point, Path::new("/"));
        assert_eq!(root.fstype, "ext4");

        let data = &mounts[2];
        assert_eq!(data.device, Path::new("/dev/mapper/vg0-data"));
        assert_eq!(data.point, Path::new("/srv/data"));
        assert_eq!(data.fstype, "xfs");
    }

    #[test]
    fn mount_point_with_spaces() {
        let mounts =
            parse_mount_table("/dev/sdb1 on /mnt/usb stick type vfat (rw)\n").unwrap();
        assert_eq!(mounts[0].point, Path::new("/mnt/usb stick"));
    }

    #[test]
    fn malformed_line_is_an_error() {
        let err = parse_mount_table("not a mount line\n").unwrap_err();
        assert!(matches!(err, ProbeError::Parse { .. }));
    }
}
