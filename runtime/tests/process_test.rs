/*!
 * Process Tests
 * Signals, external accounting, heap helpers and miscellaneous state
 */

use pretty_assertions::assert_eq;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use vm_runtime::core::limits::MAX_INTERNAL_PAYLOAD;
use vm_runtime::{
    AllocationResult, ErrorObject, HeapConfig, Method, Object, Process, ProcessBuilder,
    ProcessGroup, ProcessState, Program, Signal,
};

fn process_with(pid: u32, config: HeapConfig) -> Arc<Process> {
    let program = Program::new("process-test", Method(1));
    let group = Arc::new(ProcessGroup::new(0, program, false, None));
    let process = ProcessBuilder::new(pid, Arc::clone(&group))
        .with_heap_config(config)
        .build()
        .unwrap();
    group.add(&process);
    process
}

fn process() -> Arc<Process> {
    process_with(1, HeapConfig::default())
}

#[test]
fn test_soft_limit_scenario() {
    let process = process_with(1, HeapConfig::default().with_external_limit(1000));
    assert_eq!(process.external_bytes(), 0);

    assert!(!process.should_allow_external_allocation(1500));
    assert_eq!(process.last_allocation_result(), AllocationResult::HitLimit);

    assert!(process.should_allow_external_allocation(500));
    assert_eq!(process.last_allocation_result(), AllocationResult::Success);
}

#[test]
fn test_hard_limit_counts_object_bytes() {
    let process = process_with(1, HeapConfig::default().with_max_heap_size(2048));
    assert!(process.should_allow_external_allocation(1024));

    process.allocate_byte_array(1000, false).unwrap();
    assert!(!process.should_allow_external_allocation(1024));
    assert!(!process.system_refused_memory());
}

#[test]
fn test_invalid_lengths_always_yield_an_error() {
    let process = process();
    for length in [-1, -4096, isize::MIN] {
        assert_eq!(
            process.allocate_byte_array(length, false),
            Err(ErrorObject::InvalidArgument)
        );
        assert_eq!(
            process.allocate_string_of_length(length),
            Err(ErrorObject::InvalidArgument)
        );
    }
    assert_eq!(
        process.allocate_byte_array(isize::MAX, true),
        Err(ErrorObject::OutOfMemory)
    );
}

#[test]
fn test_string_helpers() {
    let process = process();
    let r = process.allocate_string("hello world").unwrap();
    assert_eq!(process.object_heap().get(r).as_str(), Some("hello world"));

    let blank = process.allocate_string_of_length(3).unwrap();
    assert_eq!(process.object_heap().get(blank).as_str(), Some("\0\0\0"));

    match process.allocate_string_or_error("ok") {
        Object::Heap(r) => assert_eq!(process.object_heap().get(r).as_str(), Some("ok")),
        Object::Error(e) => panic!("unexpected error {}", e),
    }
}

#[test]
fn test_external_string_is_finalized() {
    let process = process();
    let content = "y".repeat(MAX_INTERNAL_PAYLOAD * 2);
    let r = process.allocate_string(&content).unwrap();
    assert_eq!(process.external_bytes(), content.len());
    assert_eq!(process.object_heap().get(r).as_str(), Some(content.as_str()));

    process.object_heap().release(r);
    assert_eq!(process.scavenge(), 1);
    assert_eq!(process.external_bytes(), 0);
    assert_eq!(process.usage().gc_count, 1);
}

#[test]
fn test_external_allocation_hit_limit_leaves_no_trace() {
    let process = process_with(1, HeapConfig::default().with_external_limit(100));
    let before = process.object_heap().object_count();

    assert_eq!(
        process.allocate_byte_array(200, true),
        Err(ErrorObject::OutOfMemory)
    );
    assert_eq!(process.external_bytes(), 0);
    assert_eq!(process.object_heap().object_count(), before);
    assert_eq!(process.last_allocation_result(), AllocationResult::HitLimit);
}

#[test]
fn test_finalizer_forwarding() {
    let process = process();
    let key = process.allocate_byte_array(4, false).unwrap();
    let lambda = process.allocate_byte_array(0, false).unwrap();

    assert!(process.add_finalizer(key, lambda));
    assert!(process.has_finalizer(key, lambda));
    assert!(process.remove_finalizer(key));
    assert!(!process.has_finalizer(key, lambda));
    assert!(process.add_vm_finalizer(key));
    assert!(!process.add_vm_finalizer(key));
    assert_eq!(process.next_finalizer_to_run(), None);
}

#[test]
fn test_concurrent_signals_are_not_lost() {
    let process = process();
    let signals = [Signal::Kill, Signal::PrintStackTrace, Signal::Preempt, Signal::Watchdog];

    let handles: Vec<_> = signals
        .iter()
        .map(|&signal| {
            let process = Arc::clone(&process);
            thread::spawn(move || {
                for _ in 0..1000 {
                    process.signal(signal);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(process.signals().bits(), 0b1111);
    process.clear_signal(Signal::Preempt);
    assert_eq!(process.signals().to_string(), "[KILL|PRINT_STACK_TRACE|WATCHDOG]");
}

#[test]
fn test_is_suspended_follows_state() {
    let process = process();
    for state in ProcessState::ALL {
        process.set_state(state);
        let expected = matches!(
            state,
            ProcessState::SuspendedIdle | ProcessState::SuspendedScheduled
        );
        assert_eq!(process.is_suspended(), expected, "{}", state);
    }
}

#[test]
fn test_random_seed_is_deterministic() {
    let a = process_with(1, HeapConfig::default());
    let b = process_with(2, HeapConfig::default());
    a.random_seed(b"seed");
    b.random_seed(b"seed");

    let xs: Vec<u64> = (0..5).map(|_| a.random()).collect();
    let ys: Vec<u64> = (0..5).map(|_| b.random()).collect();
    assert_eq!(xs, ys);
}

#[test]
fn test_misc_state() {
    let process = process();
    assert_eq!(process.current_directory(), -1);
    process.set_current_directory(9);
    assert_eq!(process.current_directory(), 9);

    assert!(!process.idle_since_scavenge());
    process.set_idle_since_scavenge(true);
    assert!(process.idle_since_scavenge());

    assert!(process.is_in_group());
    assert!(!process.is_privileged());
    assert!(process.number_of_blocks() >= 1);

    let line = process.to_string();
    assert!(line.starts_with("Process #1 [program: process-test"));
    assert!(line.contains("state: IDLE"));
}

#[test]
#[should_panic(expected = "already in a process group")]
fn test_double_group_link_is_fatal() {
    let process = process();
    process.group().add(&process);
}

#[test]
fn test_rejected_group_add_leaves_membership_intact() {
    let process = process();
    let group = Arc::clone(process.group());

    let result = panic::catch_unwind(AssertUnwindSafe(|| group.add(&process)));
    assert!(result.is_err());
    assert_eq!(group.members(), vec![process.id()]);
    assert_eq!(group.member_count(), 1);

    assert!(group.remove(&process));
    assert!(group.is_empty());
}
