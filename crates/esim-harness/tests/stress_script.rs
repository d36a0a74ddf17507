//! Full stress runs with hand-checked checkpoint values.

use esim::IndirectionFailurePolicy;
use esim_harness::{StepStatus, StressConfig, run_stress};
use std::fs;

fn default_run() -> esim_harness::StressReport {
    run_stress(&StressConfig::default()).expect("stress run")
}

#[test]
fn every_operation_keeps_the_engine_consistent() {
    let report = default_run();
    assert_eq!(report.operations, 100);
    assert!(report.passed, "violations: {:?}", report.violations);
    assert_eq!(report.checkpoints.len(), 5);
    assert_eq!(
        report.checkpoints.iter().map(|c| c.op).collect::<Vec<_>>(),
        vec![20, 40, 60, 80, 100]
    );
    assert_eq!(
        report.created + report.deleted + report.failed + report.not_found,
        100
    );
    assert!(report.peak_fragmentation >= report.final_fragmentation);
}

#[test]
fn second_batch_runs_out_of_blocks() {
    let report = default_run();
    let cp = &report.checkpoints[0].snapshot;
    // file_01..10 take 0..50, file_11..17 take 50..120, 18..20 do not fit.
    assert_eq!(cp.active_files, 17);
    assert_eq!(cp.occupied_blocks, 120);
    assert_eq!(cp.free_blocks, 8);
    assert_eq!(cp.free_inodes, 15);
    assert!(cp.fragmentation.abs() < f64::EPSILON);
    assert_eq!(cp.files_with_indirection, 0);
    assert_eq!(cp.operation, 17);

    for op in [18, 19, 20] {
        let entry = &report.log[op - 1];
        assert_eq!(entry.status, StepStatus::Failed);
        assert_eq!(entry.error_kind.as_deref(), Some("insufficient_blocks"));
    }
}

#[test]
fn hole_reuse_fragments_small_files() {
    let report = default_run();
    let cp = &report.checkpoints[1];
    assert_eq!(cp.op, 40);
    let snap = &cp.snapshot;
    assert_eq!(snap.active_files, 18);
    assert_eq!(snap.occupied_blocks, 92);
    assert_eq!(snap.free_blocks, 36);
    assert_eq!(snap.free_inodes, 14);
    // file_24 spans 24,35,36 and file_29 spans 69,90,91: 2 breaks over 92 blocks.
    assert!((snap.fragmentation - 2.17).abs() < f64::EPSILON);

    let fragmented: Vec<&str> = snap
        .files
        .iter()
        .filter(|f| f.is_fragmented)
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(fragmented, ["file_24", "file_29"]);

    // file_18 was never created.
    assert_eq!(report.log[38].status, StepStatus::NotFound);
    assert_eq!(snap.operation, 36);
}

#[test]
fn artifacts_are_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("stress");
    let config = StressConfig {
        output_dir: Some(out.clone()),
        ..StressConfig::default()
    };
    let report = run_stress(&config).expect("stress run");

    let ndjson = fs::read_to_string(out.join("ops.ndjson")).expect("ops.ndjson");
    assert_eq!(ndjson.lines().count(), 100);
    for line in ndjson.lines() {
        let _: serde_json::Value = serde_json::from_str(line).expect("valid json line");
    }

    let csv = fs::read_to_string(out.join("checkpoints.csv")).expect("checkpoints.csv");
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows.len(), 6);
    assert!(rows[0].starts_with("op,active_files,occupied_blocks"));
    assert!(rows[2].starts_with("40,18,92,2.17,14,36,0,"));

    let json = fs::read_to_string(out.join("report.json")).expect("report.json");
    let parsed: esim_harness::StressReport = serde_json::from_str(&json).expect("parse report");
    assert_eq!(parsed.checkpoints.len(), report.checkpoints.len());
    assert!(parsed.log.is_empty());
}

#[test]
fn custom_checkpoints_and_policy() {
    let config = StressConfig {
        checkpoints: vec![5, 100],
        ..StressConfig::default()
    };
    let report = run_stress(&config).expect("stress run");
    assert_eq!(report.checkpoints.len(), 2);
    assert_eq!(report.checkpoints[0].snapshot.occupied_blocks, 25);

    let mut leaky = StressConfig::default();
    leaky.engine.indirection_failure = IndirectionFailurePolicy::LeakDirectBlocks;
    leaky.verify_every_op = false;
    let leaky_report = run_stress(&leaky).expect("stress run");
    assert_eq!(leaky_report.operations, 100);
    assert!(leaky_report.violations.is_empty());

    let bad = StressConfig {
        checkpoints: vec![0],
        ..StressConfig::default()
    };
    assert!(run_stress(&bad).is_err());
}
