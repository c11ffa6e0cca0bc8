//! 実行状態とフレームキャッシュ、プロパティ問い合わせのテスト

use std::sync::Arc;
use tomari_core::{
    ExtendedPropertyFields, FrameInfoFields, NativeFrame, Thread, ThreadError, ThreadPropertyFields,
    ThreadProperties, ThreadState,
};
use tomari_target::SimulatedTarget;

fn stopped_thread(tid: u32) -> (Arc<SimulatedTarget>, Arc<Thread>) {
    let target = Arc::new(SimulatedTarget::new());
    target.set_stack(
        tid,
        vec![
            NativeFrame::new(0x7f00).with_module("libc.so.6"),
            NativeFrame::new(0x4010)
                .with_function("_ZN4demo7compute17h0123456789abcdefE")
                .with_module("demo")
                .with_arg("n", 10),
            NativeFrame::new(0x4000).with_function("main").with_module("demo"),
        ],
    );
    let thread = Thread::new(tid, Some("main"), target.clone());
    thread.set_running(false);
    (target, thread)
}

#[test]
fn test_suspend_resume_sequences_track_count() {
    let target = Arc::new(SimulatedTarget::new());
    // 擬似乱数で Suspend/Resume の列を作る
    let mut seed: u32 = 0x2545_f491;

    for round in 0..32 {
        let thread = Thread::new(round + 2, None, target.clone());
        let mut expected: u32 = 0;

        for _ in 0..64 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            if (seed >> 16) % 3 == 0 && expected > 0 {
                expected -= 1;
                assert_eq!(thread.resume(), Ok(expected));
            } else {
                expected += 1;
                assert_eq!(thread.suspend(), expected);
            }

            assert_eq!(thread.suspend_count(), expected);
            let state = thread.state();
            if expected > 0 {
                assert_eq!(state, ThreadState::Suspended);
            } else {
                assert_eq!(state, ThreadState::Running);
            }
        }
    }
}

#[test]
fn test_over_resume_is_reported() {
    let target = Arc::new(SimulatedTarget::new());
    let thread = Thread::new(2, None, target);

    assert_eq!(thread.resume(), Err(ThreadError::NotSuspended(2)));
    assert_eq!(thread.suspend_count(), 0);
}

#[test]
fn test_frames_invalidated_by_stop() {
    let (target, thread) = stopped_thread(1);
    let before = thread.frames().unwrap();
    assert_eq!(before.len(), 3);
    assert!(before.iter().all(|f| f.is_valid()));

    thread.set_running(false);
    assert!(before.iter().all(|f| !f.is_valid()));
    assert_eq!(before[1].info(FrameInfoFields::all(), 10), Err(ThreadError::StaleFrame));

    thread.set_running(true);
    thread.set_running(false);
    let after = thread.frames().unwrap();
    assert_eq!(after.len(), 3);
    assert!(after.iter().zip(&before).all(|(new, old)| new != old));
    assert!(after.iter().all(|f| f.generation() > before[0].generation()));
    assert_eq!(target.walk_count(), 2);
}

#[test]
fn test_enumerate_frames_is_idempotent_while_stopped() {
    let (target, thread) = stopped_thread(1);

    let first = thread.enumerate_frames(FrameInfoFields::all(), 10).unwrap();
    let second = thread.enumerate_frames(FrameInfoFields::all(), 10).unwrap();
    assert_eq!(first, second);
    assert_eq!(target.walk_count(), 1);

    assert_eq!(first[0].function_name.as_deref(), Some(""));
    assert_eq!(first[1].function_name.as_deref(), Some("demo::compute(n=10)"));
    assert_eq!(first[2].address, Some(0x4000));
}

#[test]
fn test_enumerate_frames_reports_walk_failure() {
    let target = Arc::new(SimulatedTarget::new());
    target.fail_walks_for(4);
    let thread = Thread::new(4, None, target.clone());
    thread.set_running(false);

    let result = thread.enumerate_frames(FrameInfoFields::all(), 10);
    assert!(matches!(result, Err(ThreadError::StackWalk(_))));

    // 失敗はキャッシュされず、次の問い合わせで再度ウォークする
    assert!(thread.frames().is_err());
    assert_eq!(target.walk_count(), 2);
}

#[test]
fn test_properties_id_only() {
    let (target, thread) = stopped_thread(1);

    let props = thread.properties(ThreadPropertyFields::id());
    assert_eq!(
        props,
        ThreadProperties {
            id: Some(1),
            ..Default::default()
        }
    );
    assert_eq!(target.walk_count(), 0);
}

#[test]
fn test_properties_location_refreshes_cache_once() {
    let (target, thread) = stopped_thread(1);

    let props = thread.properties(ThreadPropertyFields::location());
    assert_eq!(props.location.as_deref(), Some("demo::compute"));
    assert_eq!(target.walk_count(), 1);

    thread.properties(ThreadPropertyFields::all());
    assert_eq!(target.walk_count(), 1);
}

#[test]
fn test_properties_all_fields() {
    let (_target, thread) = stopped_thread(1);

    let props = thread.properties(ThreadPropertyFields::all());
    assert_eq!(props.id, Some(1));
    assert_eq!(props.suspend_count, Some(1));
    assert_eq!(props.state, Some(ThreadState::Stopped));
    assert_eq!(props.priority.as_deref(), Some("<unknown priority>"));
    assert_eq!(props.name.as_deref(), Some("main"));
}

#[test]
fn test_extended_properties_include_full_base() {
    let (_target, thread) = stopped_thread(1);

    let props = thread.properties100(ExtendedPropertyFields::default());
    assert_eq!(props.base, thread.properties(ThreadPropertyFields::all()));
    assert_eq!(props.display_name, None);
    assert_eq!(props.category, None);

    thread.set_display_name("Main Thread");
    let props = thread.properties100(ExtendedPropertyFields::all());
    assert_eq!(props.display_name.as_deref(), Some("Main Thread"));
    assert_eq!(props.base.name.as_deref(), Some("main"));
    assert_eq!(props.category, Some(tomari_core::ThreadCategory::Main));
    assert_eq!(props.affinity, Some(0));
    assert_eq!(props.priority_id, Some(0));
}

#[test]
fn test_resume_during_stack_walk_discards_walk() {
    let (target, thread) = stopped_thread(1);
    let gate = target.gate_walk(1);

    let walking = Arc::clone(&thread);
    let handle = std::thread::spawn(move || walking.frames());

    gate.wait_entered(1);
    thread.set_running(true);
    gate.open();

    assert_eq!(handle.join().unwrap(), Err(ThreadError::StaleFrame));

    // 次の問い合わせは新しい世代でウォークし直す
    let frames = thread.frames().unwrap();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.is_valid()));
    assert_eq!(target.walk_count(), 2);

    thread.set_running(false);
    let restopped = thread.frames().unwrap();
    assert!(restopped[0].generation() > frames[0].generation());
    assert_eq!(target.walk_count(), 3);
}
