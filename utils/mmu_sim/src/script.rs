use anyhow::{bail, Context, Result};
use mmu::{AccessRights, Pid, Vpn};
use regex::Regex;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Alloc { vpn: Vpn, rights: AccessRights },
    Free { vpn: Vpn },
    Read { vpn: Vpn },
    Write { vpn: Vpn },
    Switch { pid: Pid },
    Show,
    Tlb,
    Frames,
    Ready,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Alloc { vpn, rights } => write!(f, "alloc {} {}", vpn.0, rights),
            Command::Free { vpn } => write!(f, "free {}", vpn.0),
            Command::Read { vpn } => write!(f, "read {}", vpn.0),
            Command::Write { vpn } => write!(f, "write {}", vpn.0),
            Command::Switch { pid } => write!(f, "switch {}", pid.0),
            Command::Show => f.write_str("show"),
            Command::Tlb => f.write_str("tlb"),
            Command::Frames => f.write_str("frames"),
            Command::Ready => f.write_str("ready"),
        }
    }
}

/// One command together with the script line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScriptLine {
    pub line: usize,
    pub command: Command,
}

/// Parse a command script. Blank lines and `#` comments are skipped.
///
/// ```text
/// alloc 0 rw     # map vpn 0 writable
/// write 0
/// switch 1       # forks pid 1 from the current process
/// ```
pub fn parse_script(content: &str) -> Result<Vec<ScriptLine>> {
    let alloc_re = Regex::new(r"^alloc\s+(\d+)\s+(r|w|rw)$")?;
    let page_re = Regex::new(r"^(free|read|write)\s+(\d+)$")?;
    let switch_re = Regex::new(r"^switch\s+(\d+)$")?;
    let inspect_re = Regex::new(r"^(show|tlb|frames|ready)$")?;

    let mut commands = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let text = raw.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }

        let command = if let Some(captures) = alloc_re.captures(text) {
            Command::Alloc {
                vpn: Vpn(parse_number(&captures[1], line)?),
                rights: parse_rights(&captures[2]),
            }
        } else if let Some(captures) = page_re.captures(text) {
            let vpn = Vpn(parse_number(&captures[2], line)?);
            match &captures[1] {
                "free" => Command::Free { vpn },
                "read" => Command::Read { vpn },
                _ => Command::Write { vpn },
            }
        } else if let Some(captures) = switch_re.captures(text) {
            Command::Switch {
                pid: Pid(parse_number(&captures[1], line)?),
            }
        } else if let Some(captures) = inspect_re.captures(text) {
            match &captures[1] {
                "show" => Command::Show,
                "tlb" => Command::Tlb,
                "frames" => Command::Frames,
                _ => Command::Ready,
            }
        } else {
            bail!("line {}: unrecognized command: {:?}", line, text);
        };
        commands.push(ScriptLine { line, command });
    }
    Ok(commands)
}

fn parse_number(digits: &str, line: usize) -> Result<u32> {
    digits
        .parse()
        .with_context(|| format!("line {}: number out of range: {}", line, digits))
}

// `w` alone still implies read access, matching how pages are mapped writable.
fn parse_rights(flags: &str) -> AccessRights {
    match flags {
        "r" => AccessRights::read_only(),
        _ => AccessRights::read_write(),
    }
}
