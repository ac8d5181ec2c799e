use std::process::Command;

use serde::{
    Deserialize,
    Serialize,
};

use crate::constants::layout::{
    DEFAULT_ALIGNMENT,
    SECTOR_SIZE,
};
use crate::errors::ProvError;
use crate::utils::shell;

// For parsing Linux blkid output
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryBlkid {
    #[serde(rename = "UUID")]
    pub uuid: Option<String>,

    #[serde(rename = "PARTUUID")]
    pub part_uuid: Option<String>,

    #[serde(rename = "TYPE")]
    pub dev_type: Option<String>,
}

/// Parses one line of blkid output, e.g.
/// `/dev/sda1: UUID="1234-ABCD" TYPE="vfat" PARTUUID="..."`
pub fn parse_blkid_line(line: &str) -> Result<Option<(String, EntryBlkid)>, ProvError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (dev_name, rest) = line
        .split_once(':')
        .ok_or_else(|| ProvError::ProvRsBug(format!("unexpected blkid output: {line}")))?;

    // Make dev_data looks like TOML
    // KEY1="VAL1"
    // KEY2="VAL2"
    let dev_entry: Vec<&str> = rest.split_whitespace().collect();
    let dev_entry = dev_entry.join("\n");

    let entry: EntryBlkid = toml::from_str(&dev_entry)
        .map_err(|err| ProvError::ProvRsBug(format!("failed to unmarshal blkid output: {err}")))?;

    Ok(Some((dev_name.to_string(), entry)))
}

/// Looks up the UUID on `device`. blkid exits with 2 when
/// the device carries no recognizable signature.
pub fn uuid(device: &str) -> Result<Option<String>, ProvError> {
    log::debug!("exec: blkid -s UUID -s TYPE -s PARTUUID {device}");

    let output = Command::new("blkid")
        .args(["-s", "UUID", "-s", "TYPE", "-s", "PARTUUID", device])
        .output()
        .map_err(|err| ProvError::CmdFailed {
            error: Some(err),
            context: "blkid command failed".to_string(),
        })?;

    match output.status.code() {
        Some(0) => {}
        Some(2) => return Ok(None),
        _ => {
            return Err(ProvError::CmdFailed {
                error: None,
                context: format!(
                    "blkid {device}: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }

    let stdout = String::from_utf8(output.stdout)
        .map_err(|err| ProvError::ProvRsBug(format!("blkid output not string: {err}")))?;

    for line in stdout.lines() {
        if let Some((_, entry)) = parse_blkid_line(line)? {
            return Ok(entry.uuid);
        }
    }

    Ok(None)
}

pub fn capacity(device: &str) -> Result<u64, ProvError> {
    let out = shell::exec_output("blockdev", &["--getsize64", device])?;

    out.trim().parse::<u64>().map_err(|err| {
        ProvError::ProvRsBug(format!("bad blockdev output for {device}: {out}: {err}"))
    })
}

/// Logical sector size of `device`, the unit of sfdisk offsets
pub fn sector_size(device: &str) -> Result<u64, ProvError> {
    let out = shell::exec_output("blockdev", &["--getss", device])?;

    parse_sector_size(&out)
}

fn parse_sector_size(out: &str) -> Result<u64, ProvError> {
    match out.trim().parse::<u64>() {
        Ok(n) if n >= SECTOR_SIZE && n.is_power_of_two() => Ok(n),
        Ok(n) => Err(ProvError::ProvRsBug(format!("bad logical sector size {n}"))),
        Err(err) => Err(ProvError::ProvRsBug(format!(
            "bad blockdev sector size {out}: {err}"
        ))),
    }
}

pub fn alignment(device: &str) -> Result<u64, ProvError> {
    let out = shell::exec_output("lsblk", &["-bndo", "MIN-IO,OPT-IO", device])?;
    let (min_io, opt_io) = parse_io_sizes(&out)?;

    Ok(io_alignment(min_io, opt_io))
}

fn parse_io_sizes(out: &str) -> Result<(u64, u64), ProvError> {
    let sizes = out
        .split_whitespace()
        .map(|s| s.parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|err| ProvError::ProvRsBug(format!("bad lsblk io sizes {out}: {err}")))?;

    match sizes.as_slice() {
        [min_io, opt_io] => Ok((*min_io, *opt_io)),
        _ => Err(ProvError::ProvRsBug(format!("bad lsblk io sizes: {out}"))),
    }
}

/// Smallest boundary that satisfies both the device's reported I/O
/// sizes and the 1 MiB convention
pub fn io_alignment(min_io: u64, opt_io: u64) -> u64 {
    [min_io, opt_io]
        .into_iter()
        .filter(|n| *n > 0 && n % SECTOR_SIZE == 0)
        .fold(DEFAULT_ALIGNMENT, lcm)
}

/// Lists partitions of `device` as reported by lsblk
pub fn partitions(device: &str) -> Result<Vec<String>, ProvError> {
    let out = shell::exec_output("lsblk", &["-lnpo", "NAME,TYPE", device])?;

    Ok(parse_lsblk_partitions(&out))
}

fn parse_lsblk_partitions(out: &str) -> Vec<String> {
    out.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(name), Some("part")) => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

fn gcd(a: u64, b: u64) -> u64 {
    match b {
        0 => a,
        _ => gcd(b, a % b),
    }
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}
