//! Custom assertion helpers for integration tests.

use sk_protocol::ipc::Event;
use sk_protocol::run_models::{FailureKind, Run, RunStatus};

/// Assert that a run completed, printing its error otherwise.
#[allow(dead_code)]
pub fn assert_completed(run: &Run) {
    assert_eq!(
        run.status,
        RunStatus::Completed,
        "Run should complete, failed with: {:?}",
        run.error_message
    );
    assert_eq!(run.progress_percentage, 100.0);
}

/// Assert that a run failed with the given kind.
#[allow(dead_code)]
pub fn assert_failed_with(run: &Run, kind: FailureKind) {
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.failure_kind,
        Some(kind),
        "Unexpected failure: {:?}",
        run.error_message
    );
}

/// Assert that events start with RunStarted and end in a terminal event.
///
/// # Panics
///
/// Panics if the sequence is empty or out of order.
#[allow(dead_code)]
pub fn assert_event_sequence(events: &[Event]) {
    if events.is_empty() {
        panic!("Event sequence is empty");
    }

    assert!(
        matches!(events[0], Event::RunStarted { .. }),
        "First event should be RunStarted, got: {:?}",
        events[0]
    );

    let last = events.last().unwrap();
    assert!(
        matches!(last, Event::RunCompleted { .. } | Event::RunError { .. }),
        "Last event should be RunCompleted or RunError, got: {:?}",
        last
    );
}

/// Count BlockStarted events.
#[allow(dead_code)]
pub fn count_block_started(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::BlockStarted { .. }))
        .count()
}

/// Progress values reported by status updates, in order.
#[allow(dead_code)]
pub fn progress_values(events: &[Event]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::RunStatusUpdate {
                progress_percentage,
                ..
            } => Some(*progress_percentage),
            _ => None,
        })
        .collect()
}
