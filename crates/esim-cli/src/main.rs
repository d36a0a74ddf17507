#![forbid(unsafe_code)]

mod render;
mod script;

use anyhow::{Context, Result, bail};
use esim::{
    AllocEngine, BlockState, EngineConfig, EsimError, FileInfo, HistoryEntry, InodeId, Statistics,
};
use script::{Command, Target, parse_line};
use serde::Serialize;
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Result of one script command, rendered as text or one JSON line.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Output {
    Created { file: FileInfo },
    Deleted { inode: InodeId, name: String },
    Files { files: Vec<FileInfo> },
    Stats { stats: Statistics },
    Fragmentation { percent: f64 },
    Disk { blocks: Vec<BlockState> },
    History { entries: Vec<HistoryEntry> },
    Reset,
    Verified { findings: Vec<String> },
    Error { kind: String, errno: i32, message: String },
}

impl From<EsimError> for Output {
    fn from(err: EsimError) -> Self {
        Self::Error {
            kind: err.kind().to_owned(),
            errno: err.to_errno(),
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
struct Record<'a> {
    line: usize,
    command: &'a str,
    #[serde(flatten)]
    output: &'a Output,
}

#[derive(Debug, Default)]
struct Options {
    json: bool,
    strict: bool,
    config: EngineConfig,
    script: Option<PathBuf>,
    inline: Vec<String>,
}

fn main() {
    init_logging();
    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(1);
        }
    }
}

/// Engine events reach stderr through `log`; `RUST_LOG` overrides the
/// default `warn` filter.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

fn run() -> Result<i32> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(options) = parse_args(&args)? else {
        print_usage();
        return Ok(0);
    };

    let source = load_script(&options)?;
    let mut engine = AllocEngine::new(options.config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_script(&mut engine, &source, &options, &mut out)
}

fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options::default();
    let mut index = 0_usize;
    while index < args.len() {
        match args[index].as_str() {
            "--help" | "-h" | "help" => return Ok(None),
            "--json" => options.json = true,
            "--strict" => options.strict = true,
            "--record-rejections" => options.config.record_rejections = true,
            "--policy" => {
                let raw = args.get(index + 1).context("--policy requires a value")?;
                options.config.indirection_failure = raw.parse().map_err(anyhow::Error::msg)?;
                index += 1;
            }
            "-e" => {
                let raw = args.get(index + 1).context("-e requires a command")?;
                options.inline.push(raw.clone());
                index += 1;
            }
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            path => {
                if options.script.is_some() {
                    bail!("only one script path may be given (got {path:?})");
                }
                options.script = Some(PathBuf::from(path));
            }
        }
        index += 1;
    }
    Ok(Some(options))
}

/// Inline `-e` commands win; otherwise the script file, or stdin for `-`/none.
fn load_script(options: &Options) -> Result<String> {
    if !options.inline.is_empty() {
        return Ok(options.inline.join("\n"));
    }
    match &options.script {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        _ => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("failed to read script from stdin")?;
            Ok(source)
        }
    }
}

/// Execute every line. Returns the exit code: 0, or the errno of the first
/// failed operation under `--strict`.
fn run_script(
    engine: &mut AllocEngine,
    source: &str,
    options: &Options,
    out: &mut impl Write,
) -> Result<i32> {
    for (number, line) in source.lines().enumerate() {
        let line_no = number + 1;
        let Some(command) = parse_line(line).with_context(|| format!("script line {line_no}"))?
        else {
            continue;
        };
        let output = execute(engine, &command);

        if options.json {
            let record = Record {
                line: line_no,
                command: line.trim(),
                output: &output,
            };
            writeln!(out, "{}", serde_json::to_string(&record)?)?;
        } else {
            render::text(out, &output).context("write output")?;
        }

        if let Output::Error { errno, .. } = output {
            if options.strict {
                return Ok(errno);
            }
        }
    }
    Ok(0)
}

fn execute(engine: &mut AllocEngine, command: &Command) -> Output {
    match command {
        Command::Create { name, size_bytes } => {
            match engine
                .create_file(name, *size_bytes)
                .and_then(|id| engine.file_info(id).ok_or(EsimError::InodeNotInUse(id.0)))
            {
                Ok(file) => Output::Created { file },
                Err(err) => err.into(),
            }
        }
        Command::Delete(Target::Name(name)) => match engine.delete_by_name(name) {
            Ok(inode) => Output::Deleted {
                inode,
                name: name.clone(),
            },
            Err(err) => err.into(),
        },
        Command::Delete(Target::Id(id)) => {
            let name = engine
                .inode(*id)
                .filter(|inode| inode.in_use)
                .map(|inode| inode.name.clone())
                .unwrap_or_default();
            match engine.delete_file(*id) {
                Ok(()) => Output::Deleted { inode: *id, name },
                Err(err) => err.into(),
            }
        }
        Command::List => Output::Files {
            files: engine.list_files(),
        },
        Command::Stats => Output::Stats {
            stats: engine.statistics(),
        },
        Command::Frag => Output::Fragmentation {
            percent: engine.disk_fragmentation(),
        },
        Command::Disk => Output::Disk {
            blocks: engine.disk_snapshot(),
        },
        Command::History => Output::History {
            entries: engine.history().entries().to_vec(),
        },
        Command::Reset => {
            engine.reset();
            Output::Reset
        }
        Command::Verify => Output::Verified {
            findings: engine
                .verify()
                .iter()
                .map(ToString::to_string)
                .collect(),
        },
    }
}

fn print_usage() {
    println!("esim-cli: run allocation scripts against the block allocation simulator");
    println!();
    println!("USAGE:");
    println!(
        "  esim-cli [--json] [--strict] [--policy atomic|leak] [--record-rejections] [SCRIPT | - | -e CMD...]"
    );
    println!();
    println!("COMMANDS (one per line, # starts a comment):");
    println!("  create NAME SIZE     SIZE in bytes, or KiB with a k/kb suffix");
    println!("  delete NAME | #ID    free a file by name or inode id");
    println!("  list                 in-use files with their blocks");
    println!("  stats                inode/block usage and fragmentation");
    println!("  frag                 disk fragmentation percentage");
    println!("  disk                 block map");
    println!("  history              operation log");
    println!("  verify               engine consistency check");
    println!("  reset                discard all state");
    println!();
    println!("EXIT STATUS:");
    println!("  With --strict, the first failed operation stops the script and its");
    println!("  errno becomes the exit status.");
    println!();
    println!("EXAMPLES:");
    println!("  esim-cli -e 'create a.txt 5k' -e 'create b.txt 3k' -e disk");
    println!("  esim-cli --json --strict workload.txt");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    fn run_text(source: &str, options: &Options) -> (i32, String) {
        let mut engine = AllocEngine::new(options.config);
        let mut buf = Vec::new();
        let code = run_script(&mut engine, source, options, &mut buf).unwrap();
        (code, String::from_utf8(buf).unwrap())
    }

    #[test]
    fn arguments_parse() {
        let options = parse_args(&args(&[
            "--json",
            "--policy",
            "leak",
            "-e",
            "list",
            "-e",
            "stats",
        ]))
        .unwrap()
        .unwrap();
        assert!(options.json);
        assert!(!options.strict);
        assert_eq!(
            options.config.indirection_failure,
            esim::IndirectionFailurePolicy::LeakDirectBlocks
        );
        assert_eq!(options.inline, ["list", "stats"]);

        assert!(parse_args(&args(&["--help"])).unwrap().is_none());
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["a.txt", "b.txt"])).is_err());
        assert!(parse_args(&args(&["--policy"])).is_err());
    }

    #[test]
    fn first_fit_reuse_transcript() {
        let source = "\
# reuse the hole left by a.txt
create a.txt 5k
create b.txt 3k
delete a.txt
create c.txt 2k
frag
";
        let (code, text) = run_text(source, &Options::default());
        assert_eq!(code, 0);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "created \"a.txt\" on inode 0: 5 block(s) [0, 1, 2, 3, 4]"
        );
        assert_eq!(lines[2], "deleted \"a.txt\" (inode 0)");
        assert_eq!(lines[3], "created \"c.txt\" on inode 0: 2 block(s) [0, 1]");
        assert_eq!(lines[4], "fragmentation: 0.00%");
    }

    #[test]
    fn failures_continue_unless_strict() {
        let source = "create a 1k\ncreate a 1k\ncreate b 1k\n";
        let (code, text) = run_text(source, &Options::default());
        assert_eq!(code, 0);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().starts_with("error: "));

        let strict = Options {
            strict: true,
            ..Options::default()
        };
        let (code, text) = run_text(source, &strict);
        assert_eq!(code, EsimError::DuplicateName("a".into()).to_errno());
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn json_records_carry_line_and_type() {
        let options = Options {
            json: true,
            ..Options::default()
        };
        let (_, text) = run_text("\ncreate big 13k\ndelete #7\n", &options);
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["line"], 2);
        assert_eq!(records[0]["type"], "created");
        assert_eq!(records[0]["file"]["indirect_block"], 13);
        assert_eq!(records[1]["type"], "error");
        assert_eq!(records[1]["kind"], "inode_not_in_use");
    }

    #[test]
    fn parse_errors_name_the_line() {
        let mut engine = AllocEngine::default();
        let mut sink = Vec::new();
        let err = run_script(&mut engine, "list\nexplode\n", &Options::default(), &mut sink)
            .unwrap_err();
        assert!(format!("{err:#}").contains("script line 2"));
    }
}
