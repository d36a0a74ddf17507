//! Line-oriented command scripts.
//!
//! One command per line; blank lines and lines starting with `#` are skipped.
//! Sizes are bytes by default, or KiB with a `k`/`kb` suffix.

use anyhow::{Context, Result, bail};
use esim::InodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Name(String),
    Id(InodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { name: String, size_bytes: u64 },
    Delete(Target),
    List,
    Stats,
    Frag,
    Disk,
    History,
    Reset,
    Verify,
}

/// Parse one script line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    if verb.starts_with('#') {
        return Ok(None);
    }

    let command = match verb {
        "create" | "mk" => {
            let name = words.next().context("create requires NAME SIZE")?;
            let size = words.next().context("create requires NAME SIZE")?;
            Command::Create {
                name: name.to_owned(),
                size_bytes: parse_size(size)?,
            }
        }
        "delete" | "rm" => {
            let target = words.next().context("delete requires NAME or #ID")?;
            Command::Delete(parse_target(target)?)
        }
        "list" | "ls" => Command::List,
        "stats" => Command::Stats,
        "frag" => Command::Frag,
        "disk" => Command::Disk,
        "history" => Command::History,
        "reset" => Command::Reset,
        "verify" => Command::Verify,
        other => bail!("unknown command {other:?}"),
    };

    if let Some(extra) = words.next() {
        bail!("unexpected argument {extra:?} after {verb}");
    }
    Ok(Some(command))
}

fn parse_target(raw: &str) -> Result<Target> {
    match raw.strip_prefix('#') {
        Some(digits) => {
            let id: u32 = digits
                .parse()
                .with_context(|| format!("invalid inode id {raw:?}"))?;
            Ok(Target::Id(InodeId(id)))
        }
        None => Ok(Target::Name(raw.to_owned())),
    }
}

/// Parse `4096`, `4096b`, `5k` or `5kb` into bytes.
pub fn parse_size(raw: &str) -> Result<u64> {
    let lower = raw.to_ascii_lowercase();
    let (digits, multiplier) = if let Some(kib) = lower
        .strip_suffix("kb")
        .or_else(|| lower.strip_suffix('k'))
    {
        (kib, 1024)
    } else {
        (lower.strip_suffix('b').unwrap_or(&lower), 1)
    };
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid size {raw:?}"))?;
    value
        .checked_mul(multiplier)
        .with_context(|| format!("size {raw:?} is too large"))
}
