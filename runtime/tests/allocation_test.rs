/*!
 * Allocation Manager Tests
 * External accounting through scoped allocations
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use vm_runtime::core::Guard;
use vm_runtime::{
    AllocationManager, AllocationResult, ExternalBufferGroup, HeapConfig, Method, Process,
    ProcessBuilder, ProcessGroup, Program, ResourceGroup,
};

fn process_with_limit(limit: usize) -> Arc<Process> {
    let program = Program::new("allocation-test", Method(0));
    let group = Arc::new(ProcessGroup::new(0, program, false, None));
    ProcessBuilder::new(1, group)
        .with_heap_config(HeapConfig::default().with_external_limit(limit))
        .build()
        .unwrap()
}

#[test]
fn test_alloc_then_drop_round_trip() {
    let process = process_with_limit(1 << 20);
    process.register_external_allocation(10);
    let before = process.external_bytes();

    {
        let mut manager = AllocationManager::new(&*process);
        let buffer = manager.alloc(4096).unwrap();
        buffer[0] = 1;
        assert_eq!(process.external_bytes(), before + 4096);
        assert!(manager.is_active());
    }
    assert_eq!(process.external_bytes(), before);
}

#[test]
fn test_keep_result_transfers_ownership() {
    let process = process_with_limit(1 << 20);
    let kept = {
        let mut manager = AllocationManager::new(&*process);
        manager.calloc(16, 16).unwrap();
        manager.keep_result().unwrap()
    };
    assert_eq!(kept.len(), 256);
    assert_eq!(process.external_bytes(), 256);

    // Whoever frees the buffer unregisters it.
    drop(kept);
    process.unregister_external_allocation(256);
    assert_eq!(process.external_bytes(), 0);
}

#[test]
fn test_admission_failure_sets_hit_limit() {
    let process = process_with_limit(1000);
    let mut manager = AllocationManager::new(&*process);

    assert!(manager.alloc(1500).is_none());
    assert!(manager.hit_limit());
    assert_eq!(process.last_allocation_result(), AllocationResult::HitLimit);
    assert_eq!(process.external_bytes(), 0);
}

#[test]
fn test_adopted_buffer_rolls_back() {
    let process = process_with_limit(1 << 20);
    {
        let manager = AllocationManager::adopt(&*process, vec![0; 300]);
        assert_eq!(manager.size(), 300);
        assert_eq!(process.external_bytes(), 300);
    }
    assert_eq!(process.external_bytes(), 0);
}

#[test]
fn test_buffer_group_keeps_accounting_until_teardown() {
    let process = process_with_limit(1 << 20);
    let buffers = Arc::new(ExternalBufferGroup::new());
    for size in [100, 200, 300] {
        let mut manager = AllocationManager::new(&*process);
        manager.alloc(size).unwrap();
        buffers.adopt(&mut manager).unwrap();
    }
    assert_eq!(buffers.held_bytes(), 600);
    assert_eq!(process.external_bytes(), 600);

    let stats = buffers.tear_down(&process);
    assert_eq!(stats.resources_freed, 3);
    assert_eq!(stats.bytes_freed, 600);
    assert_eq!(process.external_bytes(), 0);
    assert!(buffers.is_empty());
}

#[derive(Debug, Clone)]
enum Scope {
    Keep(usize),
    Drop(usize),
    /// Admitted, but the system allocator refuses it
    Oom(usize),
}

/// Larger than any `Vec<u8>` capacity; still admitted by an unlimited heap
const REFUSED: usize = usize::MAX / 2 + 1;

fn scope() -> impl Strategy<Value = Scope> {
    prop_oneof![
        (0usize..4096).prop_map(Scope::Keep),
        (0usize..4096).prop_map(Scope::Drop),
        (0usize..64).prop_map(|extra| Scope::Oom(REFUSED + extra)),
    ]
}

/// Runs `scopes` against `process`; returns the sum of kept sizes
fn run_scopes(process: &Process, scopes: Vec<Scope>) -> Result<usize, TestCaseError> {
    let mut expected = 0usize;
    let mut kept = Vec::new();

    for scope in scopes {
        let mut manager = AllocationManager::new(process);
        match scope {
            Scope::Keep(size) => {
                if manager.alloc(size).is_some() {
                    kept.push(manager.keep_result().unwrap());
                    expected += size;
                } else {
                    prop_assert!(manager.hit_limit());
                }
            }
            Scope::Drop(size) => {
                let _ = manager.alloc(size);
            }
            Scope::Oom(size) => {
                let admitted = process.should_allow_external_allocation(size);
                prop_assert!(manager.alloc(size).is_none());
                if admitted {
                    prop_assert!(!manager.hit_limit());
                    prop_assert_eq!(process.last_allocation_result(), AllocationResult::OutOfMemory);
                    prop_assert!(process.system_refused_memory());
                } else {
                    prop_assert!(manager.hit_limit());
                }
            }
        }
    }

    prop_assert_eq!(kept.iter().map(Vec::len).sum::<usize>(), expected);
    Ok(expected)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_net_external_equals_sum_of_kept(scopes in prop::collection::vec(scope(), 0..40)) {
        let process = process_with_limit(16 * 1024);
        let expected = run_scopes(&process, scopes)?;
        prop_assert_eq!(process.external_bytes(), expected);
    }

    #[test]
    fn prop_net_external_survives_system_refusals(scopes in prop::collection::vec(scope(), 0..40)) {
        let program = Program::new("allocation-test", Method(0));
        let group = Arc::new(ProcessGroup::new(0, program, false, None));
        let process = ProcessBuilder::new(1, group)
            .with_heap_config(HeapConfig::unlimited())
            .build()
            .unwrap();

        let expected = run_scopes(&process, scopes)?;
        prop_assert_eq!(process.external_bytes(), expected);
    }
}

#[test]
fn test_system_refusal_rolls_nothing_back() {
    let process = process_with_limit(usize::MAX);
    process.register_external_allocation(100);

    let mut manager = AllocationManager::new(&*process);
    assert!(manager.alloc(REFUSED).is_none());
    assert!(!manager.hit_limit());
    assert_eq!(process.last_allocation_result(), AllocationResult::OutOfMemory);
    drop(manager);

    assert_eq!(process.external_bytes(), 100);
}
