#![forbid(unsafe_code)]
//! Scripted stress driver for the esim allocation engine.
//!
//! Runs a fixed 100-operation create/delete script against a fresh engine,
//! samples [`EngineSnapshot`]s at configured checkpoints, times every
//! operation, and optionally cross-checks engine invariants after each step.
//!
//! The script is deterministic, so every run places blocks identically.
//! Only the timing columns differ between runs.

use anyhow::{Context, Result, bail};
use esim::{AllocEngine, BLOCK_SIZE, EngineConfig, EngineSnapshot, EsimError, InodeId};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Script operations after which a snapshot is taken by default.
pub const DEFAULT_CHECKPOINTS: [u32; 5] = [20, 40, 60, 80, 100];

// ── Script ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Create { name: String, size_kib: u64 },
    Delete { name: String },
}

impl ScriptAction {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Create { name, .. } | Self::Delete { name } => name,
        }
    }

    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
        }
    }
}

/// One numbered script operation (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub op: u32,
    #[serde(flatten)]
    pub action: ScriptAction,
}

fn file_name(n: u32) -> String {
    format!("file_{n:02}")
}

/// The fixed stress workload.
///
/// Five create batches of 5, 10, 3, 8 and 2 KiB files are interleaved with
/// scripted deletes that punch holes into earlier batches; a final batch of
/// twenty files cycles through 1..=15 KiB. Some creates in the second batch
/// fail for lack of blocks, so a few later deletes target names that never
/// existed.
#[must_use]
pub fn stress_script() -> Vec<ScriptStep> {
    let create = |n: u32, size_kib: u64| ScriptAction::Create {
        name: file_name(n),
        size_kib,
    };
    let delete = |n: u32| ScriptAction::Delete { name: file_name(n) };

    let mut actions = Vec::with_capacity(100);
    actions.extend((1..=10).map(|n| create(n, 5)));
    actions.extend((11..=20).map(|n| create(n, 10)));
    actions.extend([2, 5, 8, 12, 15].map(delete));
    actions.extend((21..=30).map(|n| create(n, 3)));
    actions.extend([3, 7, 11, 18, 22].map(delete));
    actions.extend((31..=40).map(|n| create(n, 8)));
    actions.extend([1, 6, 13, 25, 32].map(delete));
    actions.extend((41..=55).map(|n| create(n, 2)));
    actions.extend([4, 9, 10, 14, 16, 17, 19, 20, 23, 24].map(delete));
    actions.extend((0..20).map(|i| create(56 + i, u64::from(i % 15) + 1)));

    actions
        .into_iter()
        .zip(1..)
        .map(|(action, op)| ScriptStep { op, action })
        .collect()
}

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Script operations after which a snapshot is taken.
    pub checkpoints: Vec<u32>,
    /// Run the engine consistency check after every operation.
    pub verify_every_op: bool,
    /// Optional directory for `report.json`, `ops.ndjson` and `checkpoints.csv`.
    pub output_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            checkpoints: DEFAULT_CHECKPOINTS.to_vec(),
            verify_every_op: true,
            output_dir: None,
            engine: EngineConfig::default(),
        }
    }
}

// ── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    /// Delete of a name with no in-use inode; the engine is not called.
    NotFound,
}

/// Outcome of one script operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressLogEntry {
    pub op: u32,
    pub action: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_kib: Option<u64>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inode_id: Option<InodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ns: u64,
}

impl StressLogEntry {
    /// One human-readable line, e.g. `op 21: delete "file_02" - ok`.
    #[must_use]
    pub fn line(&self) -> String {
        let subject = match self.size_kib {
            Some(kib) => format!("{:?} ({kib} KiB)", self.name),
            None => format!("{:?}", self.name),
        };
        let outcome = match (self.status, &self.error) {
            (StepStatus::Ok, _) => "ok".to_owned(),
            (StepStatus::NotFound, _) => "not found".to_owned(),
            (StepStatus::Failed, Some(error)) => format!("failed: {error}"),
            (StepStatus::Failed, None) => "failed".to_owned(),
        };
        format!("op {}: {} {subject} - {outcome}", self.op, self.action)
    }
}

/// Engine state sampled after a checkpoint operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub op: u32,
    /// Mean create latency since the previous checkpoint, 0 without creates.
    pub mean_create_us: f64,
    pub snapshot: EngineSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean_us: f64,
    pub min_us: f64,
    pub max_us: f64,
}

impl LatencySummary {
    /// Summarize per-checkpoint create latencies. All zero when empty.
    #[must_use]
    pub fn from_checkpoints(checkpoints: &[Checkpoint]) -> Self {
        if checkpoints.is_empty() {
            return Self::default();
        }
        let samples = checkpoints.iter().map(|c| c.mean_create_us);
        let total: f64 = samples.clone().sum();
        Self {
            mean_us: total / f64::from(u32::try_from(checkpoints.len()).unwrap_or(u32::MAX)),
            min_us: samples.clone().fold(f64::INFINITY, f64::min),
            max_us: samples.fold(0.0, f64::max),
        }
    }
}

/// Invariant violation found by the per-operation consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub op: u32,
    pub finding: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub operations: u32,
    pub created: u32,
    pub deleted: u32,
    pub failed: u32,
    pub not_found: u32,
    pub checkpoints: Vec<Checkpoint>,
    pub latency: LatencySummary,
    pub files_with_indirection: u32,
    pub final_fragmentation: f64,
    pub peak_fragmentation: f64,
    pub violations: Vec<Violation>,
    pub passed: bool,
    pub duration_us: u64,
    /// Per-operation log; written separately as `ops.ndjson`.
    #[serde(skip)]
    pub log: Vec<StressLogEntry>,
}

impl StressReport {
    /// Serialize the operation log as newline-delimited JSON.
    pub fn log_ndjson(&self) -> Result<String> {
        let mut out = String::new();
        for entry in &self.log {
            let line = serde_json::to_string(entry).context("failed to serialize log entry")?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    /// One CSV row per checkpoint, with a header.
    pub fn checkpoints_csv(&self) -> Result<String> {
        let mut out = String::from(
            "op,active_files,occupied_blocks,fragmentation,free_inodes,free_blocks,files_with_indirection,mean_create_us\n",
        );
        for checkpoint in &self.checkpoints {
            let snap = &checkpoint.snapshot;
            writeln!(
                out,
                "{},{},{},{:.2},{},{},{},{:.3}",
                checkpoint.op,
                snap.active_files,
                snap.occupied_blocks,
                snap.fragmentation,
                snap.free_inodes,
                snap.free_blocks,
                snap.files_with_indirection,
                checkpoint.mean_create_us,
            )
            .context("format checkpoint row")?;
        }
        Ok(out)
    }

    fn count(log: &[StressLogEntry], action: &str, status: StepStatus) -> u32 {
        let n = log
            .iter()
            .filter(|e| e.status == status && (action.is_empty() || e.action == action))
            .count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

// ── Driver ──────────────────────────────────────────────────────────────────

fn validate_checkpoints(checkpoints: &[u32], script_len: usize) -> Result<()> {
    let last = u32::try_from(script_len).unwrap_or(u32::MAX);
    for &op in checkpoints {
        if op == 0 || op > last {
            bail!("checkpoint {op} is outside the script range 1..={last}");
        }
    }
    Ok(())
}

fn execute_step(engine: &mut AllocEngine, step: &ScriptStep) -> StressLogEntry {
    let start = Instant::now();
    let (status, inode_id, error): (StepStatus, Option<InodeId>, Option<EsimError>) =
        match &step.action {
            ScriptAction::Create { name, size_kib } => {
                match engine.create_file(name, size_kib * u64::from(BLOCK_SIZE)) {
                    Ok(id) => (StepStatus::Ok, Some(id), None),
                    Err(err) => (StepStatus::Failed, None, Some(err)),
                }
            }
            ScriptAction::Delete { name } => match engine.find_by_name(name) {
                Some(id) => match engine.delete_file(id) {
                    Ok(()) => (StepStatus::Ok, Some(id), None),
                    Err(err) => (StepStatus::Failed, Some(id), Some(err)),
                },
                None => (StepStatus::NotFound, None, None),
            },
        };
    let duration_ns = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);

    StressLogEntry {
        op: step.op,
        action: step.action.verb().to_owned(),
        name: step.action.name().to_owned(),
        size_kib: match &step.action {
            ScriptAction::Create { size_kib, .. } => Some(*size_kib),
            ScriptAction::Delete { .. } => None,
        },
        status,
        inode_id,
        error_kind: error.as_ref().map(|err| err.kind().to_owned()),
        error: error.map(|err| err.to_string()),
        duration_ns,
    }
}

#[expect(clippy::cast_precision_loss)]
fn mean_create_us(window: &[StressLogEntry]) -> f64 {
    let durations: Vec<u64> = window
        .iter()
        .filter(|e| e.action == "create")
        .map(|e| e.duration_ns)
        .collect();
    if durations.is_empty() {
        return 0.0;
    }
    let total: u64 = durations.iter().sum();
    total as f64 / durations.len() as f64 / 1_000.0
}

/// Run the stress script against a fresh engine built from `config.engine`.
pub fn run_stress(config: &StressConfig) -> Result<StressReport> {
    let script = stress_script();
    validate_checkpoints(&config.checkpoints, script.len())?;

    info!(
        operations = script.len(),
        checkpoints = ?config.checkpoints,
        policy = %config.engine.indirection_failure,
        "stress run started"
    );
    let started = Instant::now();
    let mut engine = AllocEngine::new(config.engine);
    let mut log = Vec::with_capacity(script.len());
    let mut checkpoints = Vec::with_capacity(config.checkpoints.len());
    let mut violations = Vec::new();
    let mut window_start = 0_usize;

    for step in &script {
        let entry = execute_step(&mut engine, step);
        debug!(op = step.op, line = %entry.line(), "stress step");
        log.push(entry);

        if config.verify_every_op {
            violations.extend(engine.verify().into_iter().map(|finding| Violation {
                op: step.op,
                finding: finding.to_string(),
            }));
        }

        if config.checkpoints.contains(&step.op) {
            checkpoints.push(Checkpoint {
                op: step.op,
                mean_create_us: mean_create_us(&log[window_start..]),
                snapshot: engine.snapshot(),
            });
            window_start = log.len();
        }
    }

    let final_snapshot = engine.snapshot();
    let peak_fragmentation = checkpoints
        .iter()
        .map(|c| c.snapshot.fragmentation)
        .fold(final_snapshot.fragmentation, f64::max);

    let report = StressReport {
        operations: u32::try_from(log.len()).unwrap_or(u32::MAX),
        created: StressReport::count(&log, "create", StepStatus::Ok),
        deleted: StressReport::count(&log, "delete", StepStatus::Ok),
        failed: StressReport::count(&log, "", StepStatus::Failed),
        not_found: StressReport::count(&log, "", StepStatus::NotFound),
        latency: LatencySummary::from_checkpoints(&checkpoints),
        checkpoints,
        files_with_indirection: final_snapshot.files_with_indirection,
        final_fragmentation: final_snapshot.fragmentation,
        peak_fragmentation,
        passed: violations.is_empty(),
        violations,
        duration_us: u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        log,
    };

    info!(
        created = report.created,
        failed = report.failed,
        fragmentation = report.final_fragmentation,
        passed = report.passed,
        "stress run finished"
    );

    if let Some(output_dir) = &config.output_dir {
        write_artifacts(output_dir, &report)?;
    }
    Ok(report)
}

/// Write `report.json`, `ops.ndjson` and `checkpoints.csv` into `output_dir`.
pub fn write_artifacts(output_dir: &Path, report: &StressReport) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create stress output dir {}", output_dir.display()))?;

    let report_path = output_dir.join("report.json");
    let report_json = serde_json::to_string_pretty(report).context("serialize stress report")?;
    fs::write(&report_path, report_json)
        .with_context(|| format!("write {}", report_path.display()))?;

    let log_path = output_dir.join("ops.ndjson");
    fs::write(&log_path, report.log_ndjson()?)
        .with_context(|| format!("write {}", log_path.display()))?;

    let csv_path = output_dir.join("checkpoints.csv");
    fs::write(&csv_path, report.checkpoints_csv()?)
        .with_context(|| format!("write {}", csv_path.display()))?;

    Ok(())
}
