//! End-to-end workflows through the public engine API.

use esim_core::{AllocEngine, BlockKind, EngineConfig, OpKind, SharedEngine};
use esim_error::EsimError;
use esim_types::{BlockId, InodeId, TOTAL_BLOCKS};

const KIB: u64 = 1024;

#[test]
fn deletes_open_holes_that_later_files_straddle() {
    let mut engine = AllocEngine::default();
    for (name, kib) in [("a", 4), ("b", 4), ("c", 4), ("d", 4)] {
        engine.create_file(name, kib * KIB).unwrap();
    }
    engine.delete_by_name("b").unwrap(); // frees 4..8
    engine.delete_by_name("d").unwrap(); // frees 12..16

    // 6 blocks: the 4..8 hole, then 12 and 13.
    let id = engine.create_file("e", 6 * KIB).unwrap();
    let info = engine.file_info(id).unwrap();
    let expected: Vec<BlockId> = [4, 5, 6, 7, 12, 13].into_iter().map(BlockId).collect();
    assert_eq!(info.block_ids, expected);
    assert!(info.is_fragmented);
    assert_eq!(info.id, InodeId(1));

    // a: 4 blocks, c: 4 blocks, e: 6 blocks with one break.
    assert!((engine.disk_fragmentation() - 7.14).abs() < f64::EPSILON);
    assert!(engine.verify().is_empty());
}

#[test]
fn full_disk_then_drain() {
    let mut engine = AllocEngine::default();
    let mut created = Vec::new();
    for i in 0..8 {
        created.push(engine.create_file(&format!("chunk{i}"), 15 * KIB).unwrap());
    }
    // 8 * (15 data + 1 table) fills the pool exactly.
    assert_eq!(engine.superblock().free_blocks, 0);
    assert_eq!(
        engine.create_file("one-more", 1),
        Err(EsimError::InsufficientBlocks {
            needed: 1,
            available: 0
        })
    );
    let indirect = engine
        .disk_snapshot()
        .iter()
        .filter(|state| state.kind == BlockKind::Indirect)
        .count();
    assert_eq!(indirect, 8);

    for id in created {
        engine.delete_file(id).unwrap();
    }
    assert_eq!(engine.superblock().free_blocks, TOTAL_BLOCKS);
    assert!(engine.disk_fragmentation().abs() < f64::EPSILON);

    let kinds: Vec<OpKind> = engine.history().entries().iter().map(|e| e.kind).collect();
    assert_eq!(kinds.iter().filter(|k| **k == OpKind::Create).count(), 8);
    assert_eq!(kinds.iter().filter(|k| **k == OpKind::Delete).count(), 8);
}

#[test]
fn shared_engine_matches_owned_engine() {
    let shared = SharedEngine::new(EngineConfig::default());
    let mut owned = AllocEngine::default();
    for (name, size) in [("x", 3 * KIB), ("y", 13 * KIB), ("z", 1)] {
        assert_eq!(shared.create_file(name, size), owned.create_file(name, size));
    }
    shared.delete_by_name("x").unwrap();
    owned.delete_by_name("x").unwrap();

    let lhs: Vec<_> = shared.list_files().into_iter().map(|f| f.block_ids).collect();
    let rhs: Vec<_> = owned.list_files().into_iter().map(|f| f.block_ids).collect();
    assert_eq!(lhs, rhs);
    assert_eq!(shared.statistics(), owned.statistics());
}
