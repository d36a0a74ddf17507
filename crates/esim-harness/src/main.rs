#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use esim_harness::{StressConfig, run_stress, stress_script};
use std::env;
use std::path::Path;

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

/// Engine events reach stderr through `log`; `RUST_LOG` overrides the
/// default `warn` filter.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    match cmd {
        Some("script") => {
            println!("{}", serde_json::to_string_pretty(&stress_script())?);
            Ok(())
        }
        Some("run-stress") => run_stress_cmd(&args[1..]),
        Some("--help" | "-h" | "help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
    }
}

fn parse_checkpoints(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("invalid checkpoint {part:?}"))
        })
        .collect()
}

fn run_stress_cmd(args: &[String]) -> Result<()> {
    let mut config = StressConfig::default();
    let mut log_lines = false;
    let mut index = 0_usize;
    while index < args.len() {
        match args[index].as_str() {
            "--checkpoints" => {
                let raw = args
                    .get(index + 1)
                    .context("--checkpoints requires a value")?;
                config.checkpoints = parse_checkpoints(raw)?;
                index += 2;
            }
            "--policy" => {
                let raw = args.get(index + 1).context("--policy requires a value")?;
                config.engine.indirection_failure =
                    raw.parse().map_err(anyhow::Error::msg)?;
                index += 2;
            }
            "--out" => {
                let raw = args.get(index + 1).context("--out requires a value")?;
                config.output_dir = Some(Path::new(raw).to_path_buf());
                index += 2;
            }
            "--record-rejections" => {
                config.engine.record_rejections = true;
                index += 1;
            }
            "--no-verify" => {
                config.verify_every_op = false;
                index += 1;
            }
            "--log" => {
                log_lines = true;
                index += 1;
            }
            other => {
                bail!("unknown run-stress option: {other}");
            }
        }
    }

    let report = run_stress(&config)?;
    if log_lines {
        for entry in &report.log {
            eprintln!("{}", entry.line());
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.passed {
        bail!(
            "stress run found {} invariant violation(s)",
            report.violations.len()
        );
    }
    Ok(())
}

fn print_usage() {
    println!("esim-harness: scripted stress runs for the allocation engine");
    println!();
    println!("USAGE:");
    println!("  esim-harness script");
    println!(
        "  esim-harness run-stress [--checkpoints 20,40,...] [--policy atomic|leak] [--record-rejections] [--no-verify] [--log] [--out DIR]"
    );
    println!();
    println!("STRESS RUN:");
    println!("  Executes the fixed 100-operation create/delete script on a fresh engine.");
    println!("  Snapshots are taken after each checkpoint operation and a JSON report is");
    println!("  printed. --out DIR also writes report.json, ops.ndjson and checkpoints.csv.");
    println!();
    println!("EXAMPLES:");
    println!("  esim-harness run-stress --out artifacts/stress");
    println!("  RUST_LOG=esim_core=debug esim-harness run-stress --policy leak --log");
}
