//! Plain-text rendering of command results.

use crate::Output;
use esim::{BlockKind, BlockState, FileInfo, HistoryEntry, OpOutcome, SYSTEM_OWNER, Statistics};
use std::io::{self, Write};

/// Blocks per row of the disk map.
const MAP_WIDTH: usize = 16;

pub fn text(out: &mut impl Write, output: &Output) -> io::Result<()> {
    match output {
        Output::Created { file } => {
            write!(
                out,
                "created {:?} on inode {}: {} block(s) [{}]",
                file.name,
                file.id,
                file.block_count,
                file.block_list()
            )?;
            if let Some(indirect) = file.indirect_block {
                write!(out, ", indirect block {indirect}")?;
            }
            if file.is_fragmented {
                write!(out, ", fragmented")?;
            }
            writeln!(out)
        }
        Output::Deleted { inode, name } => writeln!(out, "deleted {name:?} (inode {inode})"),
        Output::Files { files } => files_table(out, files),
        Output::Stats { stats } => statistics(out, stats),
        Output::Fragmentation { percent } => writeln!(out, "fragmentation: {percent:.2}%"),
        Output::Disk { blocks } => disk_map(out, blocks),
        Output::History { entries } => history(out, entries),
        Output::Reset => writeln!(out, "engine reset"),
        Output::Verified { findings } => {
            if findings.is_empty() {
                writeln!(out, "consistent")
            } else {
                for finding in findings {
                    writeln!(out, "inconsistent: {finding}")?;
                }
                Ok(())
            }
        }
        Output::Error {
            message, errno, ..
        } => writeln!(out, "error: {message} (errno {errno})"),
    }
}

fn files_table(out: &mut impl Write, files: &[FileInfo]) -> io::Result<()> {
    if files.is_empty() {
        return writeln!(out, "(no files)");
    }
    writeln!(
        out,
        "{:>3}  {:<32}  {:>8}  {:>6}  {:<4}  {:<8}  BLOCKS",
        "ID", "NAME", "SIZE KB", "COUNT", "FRAG", "INDIRECT"
    )?;
    for file in files {
        let indirect = file
            .indirect_block
            .map_or_else(|| "-".to_owned(), |block| block.to_string());
        writeln!(
            out,
            "{:>3}  {:<32}  {:>8.2}  {:>6}  {:<4}  {:<8}  {}",
            file.id.0,
            file.name,
            file.size_kb,
            file.block_count,
            if file.is_fragmented { "yes" } else { "no" },
            indirect,
            file.block_list()
        )?;
    }
    Ok(())
}

fn statistics(out: &mut impl Write, stats: &Statistics) -> io::Result<()> {
    writeln!(
        out,
        "inodes: {} used, {} free",
        stats.used_inodes, stats.free_inodes
    )?;
    writeln!(
        out,
        "blocks: {} used, {} free",
        stats.used_blocks, stats.free_blocks
    )?;
    writeln!(out, "active files: {}", stats.active_files)?;
    writeln!(out, "fragmentation: {:.2}%", stats.fragmentation)
}

fn glyph(state: &BlockState) -> char {
    match state.kind {
        BlockKind::Free => '.',
        BlockKind::Indirect => 'I',
        BlockKind::Occupied if state.owner.as_deref() == Some(SYSTEM_OWNER) => '!',
        BlockKind::Occupied => '#',
    }
}

fn disk_map(out: &mut impl Write, blocks: &[BlockState]) -> io::Result<()> {
    for (row, chunk) in blocks.chunks(MAP_WIDTH).enumerate() {
        let cells: String = chunk.iter().map(glyph).collect();
        writeln!(out, "{:>4} |{cells}|", row * MAP_WIDTH)?;
    }
    writeln!(out, "legend: . free  # data  I indirect  ! unowned")
}

fn history(out: &mut impl Write, entries: &[HistoryEntry]) -> io::Result<()> {
    if entries.is_empty() {
        return writeln!(out, "(no history)");
    }
    for entry in entries {
        let inode = entry
            .inode_id
            .map_or_else(|| "-".to_owned(), |id| id.to_string());
        let outcome = match &entry.outcome {
            OpOutcome::Accepted => "accepted".to_owned(),
            OpOutcome::Rejected { reason, .. } => format!("rejected: {reason}"),
        };
        writeln!(
            out,
            "#{:<4} {} {:<6} {:?} {} B inode {inode} {outcome}",
            entry.seq,
            entry.timestamp,
            entry.kind.as_str(),
            entry.name,
            entry.size_bytes,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esim::AllocEngine;

    fn render(output: &Output) -> String {
        let mut buf = Vec::new();
        text(&mut buf, output).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn disk_map_marks_data_and_indirect_blocks() {
        let mut engine = AllocEngine::default();
        engine.create_file("a", 2 * 1024).unwrap();
        engine.create_file("big", 13 * 1024).unwrap();

        let map = render(&Output::Disk {
            blocks: engine.disk_snapshot(),
        });
        let rows: Vec<&str> = map.lines().collect();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0], "   0 |###############I|");
        assert_eq!(rows[1], "  16 |................|");
        assert!(rows[8].starts_with("legend"));
    }

    #[test]
    fn files_table_lists_blocks() {
        let mut engine = AllocEngine::default();
        engine.create_file("a.txt", 3 * 1024).unwrap();
        let table = render(&Output::Files {
            files: engine.list_files(),
        });
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("NAME"));
        assert!(lines[1].contains("a.txt"));
        assert!(lines[1].ends_with("0, 1, 2"));

        let empty = render(&Output::Files { files: Vec::new() });
        assert_eq!(empty, "(no files)\n");
    }

    #[test]
    fn errors_show_errno() {
        let line = render(&Output::Error {
            kind: "no_free_inode".into(),
            errno: 28,
            message: "no free inode available".into(),
        });
        assert_eq!(line, "error: no free inode available (errno 28)\n");
    }
}
