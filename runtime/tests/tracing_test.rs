/*!
 * Tracing Tests
 * Global subscriber installation and collection spans
 */

use parking_lot::Mutex;
use serial_test::serial;
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use vm_runtime::monitoring::{generate_trace_id, try_init_tracing, GcSpan};
use vm_runtime::{Method, ProcessEntry, Program, RunOutcome, Scheduler};

/// Records, per scavenge summary event, whether it fired inside a `gc` span
#[derive(Clone, Default)]
struct HeapEvents(Arc<Mutex<Vec<bool>>>);

impl<S> Layer<S> for HeapEvents
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().ends_with("memory::heap")
            || metadata.fields().field("gc_count").is_none()
        {
            return;
        }
        let in_gc = ctx
            .event_scope(event)
            .map_or(false, |mut scope| scope.any(|span| span.name() == "gc"));
        self.0.lock().push(in_gc);
    }
}

#[test]
#[serial]
fn test_subscriber_installs_once() {
    try_init_tracing();
    assert!(!try_init_tracing());
}

#[test]
#[serial]
fn test_gc_span_records_collection() {
    try_init_tracing();
    let span = GcSpan::new(7, "test");
    assert_eq!(span.trace_id().len(), 36);
    span.record_freed(3);
    drop(span);

    assert_ne!(generate_trace_id(), generate_trace_id());
}

#[test]
#[serial]
fn test_scheduler_logs_under_subscriber() {
    try_init_tracing();
    let scheduler = Scheduler::default();
    assert_eq!(scheduler.process_count(), 0);
    assert_eq!(scheduler.scavenge_idle(), 0);
}

#[test]
#[serial]
fn test_scavenge_events_land_in_gc_span() {
    let events = HeapEvents::default();
    let subscriber = tracing_subscriber::registry().with(events.clone());

    tracing::subscriber::with_default(subscriber, || {
        let scheduler = Scheduler::default();
        let group = scheduler.new_group(Program::new("traced", Method(0)), false, None);
        let process = scheduler
            .spawn(&group, ProcessEntry::Main { args: vec![] })
            .unwrap();
        let thread = scheduler.create_thread("worker");

        let running = scheduler.next_runnable(&thread, 0).unwrap();
        scheduler.park(&running, RunOutcome::AwaitingGc, 1).unwrap();
        scheduler.gc_completed(process.id(), true).unwrap();

        let running = scheduler.next_runnable(&thread, 2).unwrap();
        scheduler.park(&running, RunOutcome::Idle, 3).unwrap();
        assert_eq!(scheduler.scavenge_idle(), 0);
    });

    let seen = events.0.lock().clone();
    assert_eq!(seen, vec![true, true]);
}
