//! Atomic completion through the core boundary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gpumodel::config::GpuConfig;
use gpumodel::sm::{Core, StreamingMultiprocessor};
use gpumodel::warp::{move_warp, WarpInstruction};

#[test]
fn test_callbacks_fire_only_where_registered() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let mut w = WarpInstruction::new(32);
    w.issue(0x0000_ffff, 7, 42);

    for lane in (0..32).step_by(3) {
        let fired = Arc::clone(&fired);
        w.add_callback(lane, move |_| fired.lock().unwrap().push(lane));
    }
    assert!(w.isatomic());
    for lane in 0..32 {
        assert_eq!(w.has_callback(lane), lane % 3 == 0 && lane < 16, "lane {}", lane);
    }

    // inactive lanes with a registered callback are still delivered
    let delivered = w.do_atomic();
    let fired = fired.lock().unwrap();
    assert_eq!(delivered, fired.len());
    assert_eq!(*fired, (0..32).step_by(3).collect::<Vec<usize>>());
}

#[test]
fn test_sm_tracks_pending_atomics_around_completion() {
    let config = Arc::new(GpuConfig::h100());
    let mut sm = StreamingMultiprocessor::new(0, config);
    sm.launch_warp(0, 3);

    let hits = Arc::new(AtomicUsize::new(0));
    let mut mem_stage = WarpInstruction::new(32);
    let mut writeback = WarpInstruction::new(32);
    mem_stage.issue(u32::MAX, 3, 10);
    for lane in 0..32 {
        let hits = Arc::clone(&hits);
        mem_stage.add_callback(lane, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }
    sm.atomic_issued(3);
    assert!(sm.warp_waiting_for_atomics(3));

    // the instruction moves down the pipeline before the memory system answers
    move_warp(&mut writeback, &mut mem_stage);
    assert!(mem_stage.empty());
    assert_eq!(writeback.warp_id(), 3);

    assert_eq!(writeback.do_atomic(), 32);
    sm.atomic_completed(3);
    assert!(!sm.warp_waiting_for_atomics(3));
    assert_eq!(hits.load(Ordering::SeqCst), 32);

    writeback.clear();
    sm.warp_exit(3);
    assert_eq!(sm.live_warps(), 0);
}
