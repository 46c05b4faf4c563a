//! Partition table parsing from `parted -s <disk> unit b print`.

use crate::errors::ProbeError;
use crate::model::PartTableKind;
use crate::probe::{parse_bytes, run_ok};
use crate::runner::CommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartedPartition {
    pub number: u32,
    pub start: u64,
    /// Inclusive.
    pub last: u64,
    pub lvm_flag: bool,
}

#[derive(Debug)]
pub struct PartedReport {
    pub size: u64,
    pub table: PartTableKind,
    /// Sorted by start byte.
    pub partitions: Vec<PartedPartition>,
}

fn strip_byte_suffix(token: &str) -> &str {
    token.strip_suffix('B').unwrap_or(token)
}

pub fn parse_print(output: &str) -> Result<PartedReport, ProbeError> {
    let mut size = None;
    let mut table = None;
    let mut partitions = Vec::new();
    let mut in_rows = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("Disk ")
            && rest.starts_with('/')
        {
            let (_, value) = rest
                .split_once(':')
                .ok_or_else(|| ProbeError::parse("parted", trimmed))?;
            size = Some(parse_bytes("parted", strip_byte_suffix(value.trim()))?);
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("Partition Table:") {
            table = Some(match value.trim() {
                "msdos" => PartTableKind::Msdos,
                "gpt" => PartTableKind::Gpt,
                // "loop" means a bare filesystem, "unknown" no label at all.
                _ => PartTableKind::None,
            });
            continue;
        }

        if trimmed.starts_with("Number") {
            in_rows = true;
            continue;
        }

        if !in_rows {
            continue;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(ProbeError::parse("parted", trimmed));
        }
        let number = tokens[0]
            .parse()
            .map_err(|_| ProbeError::parse("parted", tokens[0]))?;
        let start = parse_bytes("parted", strip_byte_suffix(tokens[1]))?;
        let last = parse_bytes("parted", strip_byte_suffix(tokens[2]))?;
        let lvm_flag = tokens[3..]
            .iter()
            .any(|t| t.trim_end_matches(',') == "lvm");

        partitions.push(PartedPartition {
            number,
            start,
            last,
            lvm_flag,
        });
    }

    let size = size.ok_or_else(|| ProbeError::parse("parted", "missing Disk line"))?;
    let table = table.ok_or_else(|| ProbeError::parse("parted", "missing Partition Table line"))?;

    partitions.sort_by_key(|p| p.start);

    Ok(PartedReport {
        size,
        table,
        partitions,
    })
}

pub fn read_partitions(runner: &dyn CommandRunner, disk: &str) -> Result<PartedReport, ProbeError> {
    let output = run_ok(runner, "parted", &["-s", disk, "unit", "b", "print"])?;
    parse_print(&output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSDOS_FIXTURE: &str = "\
Model: Loopback device (loopback)
Disk /dev/loop0: 107374182400B
Sector size (logical/physical): 512B/512B
Partition Table: msdos
Disk Flags:

Number  Start        End            Size           Type     File system  Flags
 2      32256B       5368709119B    5368676864B    primary               lvm
 1      5368709120B  107374182399B  102005473280B  primary  xfs          lvm
";

    const GPT_FIXTURE: &str = "\
Model: ATA QEMU HARDDISK (scsi)
Disk /dev/sdb: 107374182400B
Sector size (logical/physical): 512B/512B
Partition Table: gpt
Disk Flags:

Number  Start   End           Size          File system  Name     Flags
 1      17408B  1073741823B   1073724416B   ext4         primary
";

    #[test]
    fn parses_msdos_table() {
        let report = parse_print(MSDOS_FIXTURE).unwrap();
        assert_eq!(report.size, 107_374_182_400);
        assert_eq!(report.table, PartTableKind::Msdos);
        assert_eq!(report.partitions.len(), 2);
        // Rows come back sorted by start, not by number.
        assert_eq!(report.partitions[0].number, 2);
        assert_eq!(report.partitions[0].start, 32_256);
        assert_eq!(report.partitions[0].last, 5_368_709_119);
        assert!(report.partitions[0].lvm_flag);
        assert_eq!(report.partitions[1].number, 1);
    }

    #[test]
    fn parses_gpt_table_without_flags() {
        let report = parse_print(GPT_FIXTURE).unwrap();
        assert_eq!(report.table, PartTableKind::Gpt);
        assert_eq!(report.partitions.len(), 1);
        assert!(!report.partitions[0].lvm_flag);
        assert_eq!(report.partitions[0].start, 0x4400);
    }

    #[test]
    fn empty_table_has_no_partitions() {
        let fixture = "\
Disk /dev/sdc: 107374182400B
Partition Table: gpt

Number  Start  End  Size  File system  Name  Flags
";
        let report = parse_print(fixture).unwrap();
        assert!(report.partitions.is_empty());
    }

    #[test]
    fn bare_filesystem_reports_no_table() {
        let fixture = "\
Disk /dev/sdd: 107374182400B
Partition Table: loop

Number  Start  End  Size  File system  Flags
 1      0B     107374182399B  107374182400B  xfs
";
        let report = parse_print(fixture).unwrap();
        assert_eq!(report.table, PartTableKind::None);
    }

    #[test]
    fn malformed_row_is_an_error() {
        let fixture = "\
Disk /dev/loop0: 107374182400B
Partition Table: msdos

Number  Start   End   Size  Type  File system  Flags
 1      garbage 123B  1B    primary
";
        assert!(matches!(
            parse_print(fixture).unwrap_err(),
            ProbeError::Parse { .. }
        ));
    }

    #[test]
    fn missing_disk_line_is_an_error() {
        assert!(matches!(
            parse_print("Partition Table: msdos\n").unwrap_err(),
            ProbeError::Parse { .. }
        ));
    }
}
