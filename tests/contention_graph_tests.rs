//! Integration tests for decoding event buffers into the contention graph
//!
//! # Test Coverage
//!
//! - ✅ Worked example: T1 waits 50 on monitor 9 owned by T2
//! - ✅ Desync detection leaves aggregates unchanged
//! - ✅ In-stream RESET clears threads and monitors
//! - ✅ ADJUST_TIME shifts open episodes
//! - ✅ Unknown threads, owners and monitors
//! - ✅ Thread announced between a dropped entry and its exit
//! - ✅ Two-timestamp wire mode
//! - ✅ Snapshot isolation from later events

use lockgraph::builder::ContentionGraph;
use lockgraph::config::{Charset, DecoderConfig};
use lockgraph::decoder::FrameDecoder;
use lockgraph::encoder::FrameEncoder;
use lockgraph::error::{Desync, TraceError};
use lockgraph::session::Session;
use lockgraph::snapshot::Subject;

/// Register T1, T2 and monitor 9
fn preamble(enc: &mut FrameEncoder) -> &mut FrameEncoder {
    enc.new_thread(1, "T1", "java.lang.Thread")
        .new_thread(2, "T2", "java.lang.Thread")
        .new_monitor(9, "java.lang.Object")
}

fn decode(graph: &mut ContentionGraph, bytes: &[u8]) -> Result<(), TraceError> {
    let summary = FrameDecoder::default().decode(bytes, graph)?;
    assert!(summary.is_complete(), "buffer stopped early: {:?}", summary.stopped);
    Ok(())
}

#[test]
fn test_worked_example_four_aggregates() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .monitor_exit(150, 9);

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    let snap = graph.snapshot();

    let t1 = snap.thread(1).unwrap().waited_on(9).unwrap();
    assert_eq!((t1.wait_time(), t1.wait_count()), (50, 1));
    assert_eq!(t1.peer(2).unwrap().wait_time(), 50);

    let t2 = snap.thread(2).unwrap().owned_monitor(9).unwrap();
    assert_eq!((t2.wait_time(), t2.wait_count()), (50, 1));
    assert_eq!(t2.peer(1).unwrap().wait_count(), 1);

    let m = snap.monitor(9).unwrap();
    assert_eq!(m.display_name(), "java.lang.Object@9");
    assert_eq!(m.waiter(1).unwrap().peer(2).unwrap().wait_time(), 50);
    assert_eq!(m.owner(2).unwrap().peer(1).unwrap().wait_time(), 50);
}

#[test]
fn test_exit_without_entry_is_desync() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .monitor_exit(150, 9);
    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    let before = graph.snapshot();

    let mut bad = FrameEncoder::default();
    bad.set_current_thread(1).monitor_exit(200, 9);
    let err = decode(&mut graph, bad.as_bytes()).unwrap_err();
    assert_eq!(
        err,
        TraceError::InconsistentTrace {
            thread: 1,
            reason: Desync::ExitWithoutEntry { monitor: 9 },
        }
    );
    assert_eq!(graph.snapshot(), before);
}

#[test]
fn test_entry_while_open_is_desync() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .new_monitor(10, "java.util.HashMap")
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .monitor_entry(110, 10, 2);

    let mut graph = ContentionGraph::new();
    let err = decode(&mut graph, enc.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        TraceError::InconsistentTrace {
            thread: 1,
            reason: Desync::EntryWhileOpen {
                open_monitor: 9,
                new_monitor: 10
            }
        }
    ));
    assert_eq!(graph.open_episode(1), Some(9));
    assert!(graph.open_waiters(10).is_empty());
}

#[test]
fn test_exit_from_other_monitor_is_desync() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .monitor_exit(150, 4);

    let mut graph = ContentionGraph::new();
    let err = decode(&mut graph, enc.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        TraceError::InconsistentTrace {
            reason: Desync::ExitMismatch { .. },
            ..
        }
    ));
    assert!(graph.snapshot().is_empty());
}

#[test]
fn test_entry_then_reset_clears_everything() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .reset();

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    assert_eq!(graph.thread_count(), 0);
    assert_eq!(graph.monitor_count(), 0);
    assert_eq!(graph.open_episode(1), None);
    assert!(graph.snapshot().is_empty());
    assert_eq!(graph.stats().resets, 1);
}

#[test]
fn test_adjust_time_shifts_open_episode() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .adjust_time(30)
        .monitor_exit(150, 9);

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    assert_eq!(graph.snapshot().total_wait_time(), 20);
}

#[test]
fn test_adjust_time_zero_is_noop() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .adjust_time(0)
        .monitor_exit(150, 9);

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    assert_eq!(graph.snapshot().total_wait_time(), 50);
}

#[test]
fn test_exit_before_entry_time_saturates() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .adjust_time(500)
        .monitor_exit(150, 9);

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    let snap = graph.snapshot();
    let agg = snap.thread(1).unwrap().waited_on(9).unwrap();
    assert_eq!(agg.wait_time(), 0);
    assert_eq!(agg.wait_count(), 1);
}

#[test]
fn test_unregistered_current_thread_drops_events() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(7)
        .monitor_entry(100, 9, 2)
        .monitor_exit(150, 9);

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    assert!(graph.snapshot().is_empty());
    assert_eq!(graph.stats().dropped_events, 2);
}

#[test]
fn test_unknown_owner_drops_entry_and_exit() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, -1)
        .monitor_exit(150, 9)
        .monitor_entry(200, 9, 42)
        .monitor_exit(260, 9);

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    assert!(graph.snapshot().is_empty());
    assert_eq!(graph.stats().dropped_events, 4);
    assert_eq!(graph.stats().episodes_opened, 0);
}

#[test]
fn test_thread_announced_mid_episode_drops_exit() {
    let mut enc = FrameEncoder::default();
    enc.new_thread(2, "T2", "java.lang.Thread")
        .new_monitor(9, "java.lang.Object")
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .new_thread(1, "T1", "java.lang.Thread")
        .set_current_thread(1)
        .monitor_exit(150, 9);

    let session = Session::default();
    session.process_buffer(enc.as_bytes()).unwrap();
    assert!(!session.is_poisoned());
    assert!(session.snapshot().is_empty());
    assert_eq!(session.stats().builder.dropped_events, 2);

    // The thread is fully usable afterwards
    let mut next = FrameEncoder::default();
    next.set_current_thread(1)
        .monitor_entry(200, 9, 2)
        .monitor_exit(230, 9);
    session.process_buffer(next.as_bytes()).unwrap();
    let snap = session.snapshot();
    assert_eq!(snap.thread(1).unwrap().waited_on(9).unwrap().wait_time(), 30);
}

#[test]
fn test_entry_while_skipped_is_desync() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .new_monitor(10, "java.util.HashMap")
        .set_current_thread(1)
        .monitor_entry(100, 9, 42)
        .monitor_entry(110, 10, 2);

    let mut graph = ContentionGraph::new();
    let err = decode(&mut graph, enc.as_bytes()).unwrap_err();
    assert_eq!(
        err,
        TraceError::InconsistentTrace {
            thread: 1,
            reason: Desync::EntryWhileOpen {
                open_monitor: 9,
                new_monitor: 10
            },
        }
    );
    assert_eq!(graph.open_episode(1), None);
    assert!(graph.open_waiters(10).is_empty());
    assert_eq!(graph.stats().episodes_opened, 0);
}

#[test]
fn test_unknown_monitor_registered_on_entry() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 0x2a, 2)
        .monitor_exit(125, 0x2a);

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    let snap = graph.snapshot();
    assert_eq!(snap.monitor(0x2a).unwrap().display_name(), "unknown@2a");
    assert_eq!(
        snap.thread(1).unwrap().waited()[0].subject(),
        Subject::Monitor(0x2a)
    );
}

#[test]
fn test_late_monitor_name_applies() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 5, 2)
        .monitor_exit(110, 5)
        .new_monitor(5, "java.util.Vector");

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    let snap = graph.snapshot();
    assert_eq!(snap.monitor(5).unwrap().display_name(), "java.util.Vector@5");
    assert_eq!(snap.monitor(5).unwrap().waiter(1).unwrap().wait_time(), 10);
}

#[test]
fn test_episode_spans_buffers() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc).set_current_thread(1).monitor_entry(100, 9, 2);
    let first = enc.take_buffer();
    enc.set_current_thread(1).monitor_exit(180, 9);
    let second = enc.take_buffer();

    let mut graph = ContentionGraph::new();
    decode(&mut graph, &first).unwrap();
    assert_eq!(graph.open_waiters(9), vec![1]);
    decode(&mut graph, &second).unwrap();
    assert_eq!(graph.snapshot().total_wait_time(), 80);
}

#[test]
fn test_current_thread_persists_across_buffers() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc).set_current_thread(1).monitor_entry(100, 9, 2);
    let first = enc.take_buffer();
    enc.monitor_exit(130, 9);
    let second = enc.take_buffer();

    let mut graph = ContentionGraph::new();
    decode(&mut graph, &first).unwrap();
    decode(&mut graph, &second).unwrap();
    assert_eq!(graph.current_thread(), Some(1));
    assert_eq!(graph.snapshot().total_wait_time(), 30);
}

#[test]
fn test_two_timestamp_mode_uses_wall_clock() {
    let config = DecoderConfig {
        two_timestamps: true,
        charset: Charset::Utf8,
    };
    let mut enc = FrameEncoder::new(config);
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry_with_cpu(1_000, 7, 9, 2)
        .adjust_time_with_cpu(100, 3)
        .monitor_exit(1_400, 9);

    let mut graph = ContentionGraph::new();
    let summary = FrameDecoder::new(config)
        .decode(enc.as_bytes(), &mut graph)
        .unwrap();
    assert!(summary.is_complete());
    assert_eq!(graph.snapshot().total_wait_time(), 300);
}

#[test]
fn test_many_waiters_on_one_owner() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc).new_thread(3, "T3", "");
    enc.set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .set_current_thread(3)
        .monitor_entry(105, 9, 2);
    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    assert_eq!(graph.open_waiters(9), vec![1, 3]);

    let mut rest = FrameEncoder::default();
    rest.set_current_thread(1)
        .monitor_exit(140, 9)
        .set_current_thread(3)
        .monitor_exit(165, 9);
    decode(&mut graph, rest.as_bytes()).unwrap();

    let snap = graph.snapshot();
    let owned = snap.thread(2).unwrap().owned_monitor(9).unwrap();
    assert_eq!(owned.wait_time(), 100);
    assert_eq!(owned.wait_count(), 2);
    let peers: Vec<u32> = owned.peers().iter().map(|p| p.thread()).collect();
    assert_eq!(peers, vec![3, 1]);
}

#[test]
fn test_snapshot_isolated_from_later_events() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .monitor_exit(150, 9);
    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    let snap = graph.snapshot();

    let mut more = FrameEncoder::default();
    more.set_current_thread(1)
        .monitor_entry(200, 9, 2)
        .monitor_exit(300, 9)
        .reset();
    decode(&mut graph, more.as_bytes()).unwrap();

    assert_eq!(snap.total_wait_time(), 50);
    assert_eq!(snap.thread(1).unwrap().waited_on(9).unwrap().wait_count(), 1);
}

#[test]
fn test_renamed_thread_keeps_aggregates() {
    let mut enc = FrameEncoder::default();
    preamble(&mut enc)
        .set_current_thread(1)
        .monitor_entry(100, 9, 2)
        .monitor_exit(150, 9)
        .new_thread(1, "renamed", "");

    let mut graph = ContentionGraph::new();
    decode(&mut graph, enc.as_bytes()).unwrap();
    let snap = graph.snapshot();
    assert_eq!(snap.thread(1).unwrap().name(), "renamed");
    assert_eq!(snap.monitor(9).unwrap().waiter(1).unwrap().name(), "renamed");
    assert_eq!(snap.total_wait_time(), 50);
}
