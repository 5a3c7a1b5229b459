mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use huddle_audio::{AudioError, DeviceOp, SourceId};
use huddle_engine::EngineError;
use huddle_ipc::{AudioEvent, SettingChange};

use common::{backend, drain, engine, frame_at, mono16, FRAME, TICK};

#[test]
fn test_gain_setter_clamps_and_persists() {
    let (facade, store) = engine(&backend());
    let events = facade.subscribe_events();

    for (requested, expected) in [(99.0, 30.0), (-100.0, -30.0), (12.5, 12.5)] {
        facade.set_input_gain(requested);
        assert_eq!(facade.input_gain(), expected);
        assert_eq!(store.current().input_gain_db, expected);
    }
    assert_eq!(store.save_count(), 3);

    let events = drain(&events);
    assert!(matches!(
        events[0],
        AudioEvent::SettingChanged(SettingChange::InputGain(g)) if g == 30.0
    ));
}

#[test]
fn test_ranged_setters_clamp() {
    let (facade, store) = engine(&backend());

    facade.set_input_threshold(0.9);
    assert_eq!(facade.input_threshold(), 0.4);

    facade.set_voice_hold(50);
    assert_eq!(facade.voice_hold(), 250);
    facade.set_voice_hold(5000);
    assert_eq!(facade.voice_hold(), 1000);

    facade.set_output_volume(-1.0);
    assert_eq!(facade.output_volume(), 0.0);

    let saved = store.current();
    assert_eq!(saved.input_threshold, 0.4);
    assert_eq!(saved.voice_hold_ms, 1000);
    assert_eq!(saved.output_volume, 0.0);
}

#[test]
fn test_changing_bounds_reclamps_current_value() {
    let (facade, store) = engine(&backend());
    facade.set_input_gain(20.0);

    facade.set_max_input_gain(10.0);
    assert_eq!(facade.bounds().max_input_gain_db, 10.0);
    assert_eq!(facade.input_gain(), 10.0);
    assert_eq!(store.current().input_gain_db, 10.0);

    facade.set_min_voice_hold(500);
    assert_eq!(facade.voice_hold(), 500);

    // Values already inside the new range are left alone.
    let saves = store.save_count();
    facade.set_min_input_threshold(0.0);
    assert_eq!(store.save_count(), saves);
}

#[test]
fn test_double_unsubscribe_leaves_input_closed() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    facade.subscribe_input().unwrap();
    assert!(facade.is_input_open());

    facade.unsubscribe_input();
    facade.unsubscribe_input();
    assert_eq!(facade.input_subscribers(), 0);
    assert!(!facade.is_input_open());
    assert_eq!(
        backend.operations(),
        [
            DeviceOp::OpenInput("Mic".to_string()),
            DeviceOp::CloseInput("Mic".to_string())
        ]
    );

    // A single subscribe after the extra unsubscribe opens the device again.
    facade.subscribe_input().unwrap();
    assert!(facade.is_input_open());
}

#[test]
fn test_input_opens_once_for_many_subscribers() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    for _ in 0..3 {
        facade.subscribe_input().unwrap();
    }
    for _ in 0..2 {
        facade.unsubscribe_input();
    }
    assert!(facade.is_input_open());
    assert_eq!(backend.operations().len(), 1);

    facade.unsubscribe_input();
    assert!(!facade.is_input_open());
}

#[test]
fn test_device_switch_without_subscribers_touches_no_device() {
    let backend = backend();
    let (facade, store) = engine(&backend);

    facade.reinit_input("USB Mic").unwrap();
    facade.reinit_output("Headphones").unwrap();

    assert!(backend.operations().is_empty());
    assert_eq!(facade.input_device(), "USB Mic");
    assert_eq!(store.current().output_device, "Headphones");

    facade.subscribe_input().unwrap();
    assert_eq!(backend.open_inputs(), ["USB Mic"]);
}

#[test]
fn test_device_switch_with_subscribers_reopens() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    facade.subscribe_input().unwrap();
    let peer = facade.subscribe_output().unwrap();
    backend.clear_operations();

    facade.reinit_input("USB Mic").unwrap();
    facade.reinit_output("Headphones").unwrap();

    assert_eq!(
        backend.operations(),
        [
            DeviceOp::CloseInput("Mic".to_string()),
            DeviceOp::OpenInput("USB Mic".to_string()),
            DeviceOp::CloseOutput("Speakers".to_string()),
            DeviceOp::OpenOutput("Headphones".to_string()),
        ]
    );

    // The peer source survives the output switch.
    facade.play_frames(peer, &[100; FRAME], FRAME, 1, 48000).unwrap();
    assert_eq!(facade.queued_buffers(peer), Some(1));
}

#[test]
fn test_missing_saved_device_falls_back_to_default() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    facade.reinit_input("Unplugged Headset").unwrap();
    facade.subscribe_input().unwrap();

    assert_eq!(backend.open_inputs(), ["Mic"]);
    assert_eq!(facade.input_device(), "Unplugged Headset");
}

#[test]
fn test_stale_source_is_unknown() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    let id = facade.subscribe_output().unwrap();
    assert!(facade.unsubscribe_output(id));
    assert!(!facade.unsubscribe_output(id));

    let result = facade.play_frames(id, &[0; FRAME], FRAME, 1, 48000);
    assert!(matches!(
        result,
        Err(EngineError::Audio(AudioError::UnknownSource(stale))) if stale == id
    ));

    // A new source never aliases the stale id.
    let fresh = facade.subscribe_output().unwrap();
    assert_ne!(fresh, id);
    assert!(facade.play_frames(id, &[0; FRAME], FRAME, 1, 48000).is_err());
    assert!(facade.play_frames(fresh, &[0; FRAME], FRAME, 1, 48000).is_ok());
}

#[test]
fn test_one_shot_replaces_previous_clip() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    facade.set_output_volume(0.5);
    facade.play_one_shot(mono16(4000, 480)).unwrap();
    facade.play_one_shot(mono16(16384, 480)).unwrap();

    assert!(facade.is_output_ready());
    assert_eq!(facade.queued_buffers(SourceId::MAIN), Some(1));

    let out = backend.render_output("Speakers", 480).unwrap();
    assert!(out.iter().all(|&s| (s - 8191).abs() <= 1), "{:?}", &out[..4]);

    // Once the clip has played, the idle output is released.
    facade.tick_now(Instant::now());
    assert!(!facade.is_output_ready());

    let metrics = facade.metrics();
    assert_eq!(metrics.one_shots_played, 2);
    assert_eq!(metrics.buffers_played, 1);
}

#[test]
fn test_output_stays_open_while_one_shot_plays() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    let peer = facade.subscribe_output().unwrap();
    facade.play_one_shot(mono16(1000, 4800)).unwrap();
    facade.unsubscribe_output(peer);

    facade.tick_now(Instant::now());
    assert!(facade.is_output_ready());

    facade.stop_active();
    assert!(!facade.is_output_ready());
}

#[test]
fn test_odd_one_shot_is_rejected() {
    let (facade, _) = engine(&backend());
    let result = facade.play_one_shot(vec![1u8, 2, 3]);
    assert!(matches!(
        result,
        Err(EngineError::Audio(AudioError::FormatNotSupported(_)))
    ));
}

#[test]
fn test_peer_audio_is_mixed() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    let a = facade.subscribe_output().unwrap();
    let b = facade.subscribe_output().unwrap();
    facade.play_frames(a, &[1000; 480], 480, 1, 48000).unwrap();
    // Stereo at 24 kHz; converted to the device format.
    facade.play_frames(b, &[2000; 480], 240, 2, 24000).unwrap();

    let out = backend.render_output("Speakers", 480).unwrap();
    assert!(out.iter().all(|&s| (s - 3000).abs() <= 1), "{:?}", &out[..4]);
    assert_eq!(facade.metrics().buffers_queued, 2);
}

#[test]
fn test_hold_scenario_forwards_frames() {
    let backend = backend();
    let (facade, _) = engine(&backend);
    let events = facade.subscribe_events();

    let forwarded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&forwarded);
    facade.add_frame_consumer(move |frame| sink.lock().push(frame.sequence));

    facade.set_input_threshold(0.1);
    facade.set_voice_hold(250);
    facade.subscribe_input().unwrap();
    drain(&events);

    let start = Instant::now();
    let mut active = Vec::new();
    for tick in 1..=20u32 {
        let volume = if tick == 1 { 0.2 } else { 0.05 };
        backend.push_input("Mic", &frame_at(volume));
        facade.tick_now(start + TICK * (tick - 1));
        active.push(facade.is_voice_active());
    }

    assert!(active[..13].iter().all(|a| *a));
    assert!(active[13..].iter().all(|a| !*a));
    assert_eq!(*forwarded.lock(), (0..13).collect::<Vec<u64>>());

    let events = drain(&events);
    let levels = events
        .iter()
        .filter(|e| matches!(e, AudioEvent::InputLevel(_)))
        .count();
    let activity: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            AudioEvent::VoiceActivity { active } => Some(*active),
            _ => None,
        })
        .collect();
    assert_eq!(levels, 20);
    assert_eq!(activity, [true, false]);

    let metrics = facade.metrics();
    assert_eq!(metrics.frames_captured, 20);
    assert_eq!(metrics.frames_forwarded, 13);
    assert_eq!(metrics.frames_dropped, 7);
}

#[test]
fn test_gain_is_applied_to_forwarded_frames() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    let peak = Arc::new(Mutex::new(0i16));
    let sink = Arc::clone(&peak);
    facade.add_frame_consumer(move |frame| *sink.lock() = frame.samples[0]);

    facade.set_input_gain(6.0);
    facade.subscribe_input().unwrap();
    backend.push_input("Mic", &[1000; FRAME]);
    facade.tick_now(Instant::now());

    let peak = *peak.lock();
    assert!((1990..=2000).contains(&peak), "{peak}");
}

#[test]
fn test_removed_consumer_stops_receiving() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    let id = facade.add_frame_consumer(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    facade.subscribe_input().unwrap();
    let now = Instant::now();
    backend.push_input("Mic", &frame_at(0.5));
    facade.tick_now(now);

    assert!(facade.remove_frame_consumer(id));
    assert!(!facade.remove_frame_consumer(id));

    backend.push_input("Mic", &frame_at(0.5));
    facade.tick_now(now + TICK);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_consumer_may_call_back_into_engine() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    let seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&seen);
    let handle = Arc::clone(&facade);
    facade.add_frame_consumer(move |_| {
        sink.store(handle.input_subscribers() as usize, Ordering::SeqCst);
    });

    facade.subscribe_input().unwrap();
    backend.push_input("Mic", &frame_at(0.5));
    facade.tick_now(Instant::now());

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_level_published_while_muted() {
    let backend = backend();
    let (facade, _) = engine(&backend);
    let events = facade.subscribe_events();

    facade.set_input_threshold(0.4);
    facade.subscribe_input().unwrap();
    backend.push_input("Mic", &frame_at(0.1));
    facade.tick_now(Instant::now());

    let level = drain(&events).into_iter().find_map(|e| match e {
        AudioEvent::InputLevel(level) => Some(level),
        _ => None,
    });
    assert!(level.is_some_and(|l| (l - 0.1).abs() < 0.01), "{level:?}");
    assert!(!facade.is_voice_active());
}

#[test]
fn test_input_failure_closes_device_until_retry() {
    let backend = backend();
    let (facade, _) = engine(&backend);
    let events = facade.subscribe_events();

    facade.subscribe_input().unwrap();
    backend.fail_input("Mic");
    facade.tick_now(Instant::now());

    assert!(!facade.is_input_open());
    let events = drain(&events);
    assert!(events
        .iter()
        .any(|e| matches!(e, AudioEvent::Error { message, .. } if message.contains("hardware"))));
    assert!(events.iter().any(|e| matches!(e, AudioEvent::DeviceClosed { .. })));

    facade.reinit_input("Mic").unwrap();
    assert!(facade.is_input_open());
}

#[test]
fn test_resubscribe_retries_failed_input() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    facade.subscribe_input().unwrap();
    backend.fail_input("Mic");
    facade.tick_now(Instant::now());
    assert!(!facade.is_input_open());

    facade.subscribe_input().unwrap();
    assert_eq!(facade.input_subscribers(), 2);
    assert!(facade.is_input_open());
    assert_eq!(backend.open_inputs(), ["Mic"]);

    // Both references must go before the device closes again.
    facade.unsubscribe_input();
    assert!(facade.is_input_open());
    facade.unsubscribe_input();
    assert!(backend.open_inputs().is_empty());
}

#[test]
fn test_failed_retry_drops_only_its_own_reference() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    facade.subscribe_input().unwrap();
    backend.fail_input("Mic");
    facade.tick_now(Instant::now());

    backend.set_fail_opens(true);
    assert!(facade.subscribe_input().is_err());
    assert_eq!(facade.input_subscribers(), 1);
    assert!(!facade.is_input_open());

    backend.set_fail_opens(false);
    facade.subscribe_input().unwrap();
    assert_eq!(facade.input_subscribers(), 2);
    assert!(facade.is_input_open());
}

#[test]
fn test_level_published_every_tick_while_capturing() {
    let backend = backend();
    let (facade, _) = engine(&backend);
    let events = facade.subscribe_events();

    facade.subscribe_input().unwrap();
    let start = Instant::now();
    backend.push_input("Mic", &frame_at(0.25));
    facade.tick_now(start);
    // No complete frame arrives on the next two ticks.
    backend.push_input("Mic", &frame_at(0.25)[..100]);
    facade.tick_now(start + TICK);
    facade.tick_now(start + TICK * 2);

    let levels: Vec<f32> = drain(&events)
        .into_iter()
        .filter_map(|e| match e {
            AudioEvent::InputLevel(level) => Some(level),
            _ => None,
        })
        .collect();
    assert_eq!(levels.len(), 3);
    assert!(levels.iter().all(|&l| l == levels[0]));
}

#[test]
fn test_timing_thread_drives_capture() {
    let backend = backend();
    let (facade, _) = engine(&backend);

    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    facade.add_frame_consumer(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    facade.subscribe_input().unwrap();
    facade.start().unwrap();
    facade.start().unwrap();
    assert!(facade.is_running());

    for _ in 0..5 {
        backend.push_input("Mic", &frame_at(0.5));
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while count.load(Ordering::SeqCst) < 5 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    facade.stop();
    assert!(!facade.is_running());
    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn test_concurrent_subscribers_leave_nothing_open() {
    let backend = backend();
    let (facade, _) = engine(&backend);
    facade.start().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let facade = Arc::clone(&facade);
            thread::spawn(move || {
                for _ in 0..50 {
                    facade.subscribe_input().unwrap();
                    let id = facade.subscribe_output().unwrap();
                    facade.play_frames(id, &[10; FRAME], FRAME, 1, 48000).unwrap();
                    facade.set_input_gain(3.0);
                    assert!(facade.unsubscribe_output(id));
                    facade.unsubscribe_input();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    facade.stop();

    assert_eq!(facade.input_subscribers(), 0);
    assert_eq!(facade.output_subscribers(), 0);
    assert!(!facade.is_input_open());
    assert!(!facade.is_output_ready());
    assert!(backend.open_inputs().is_empty());
    assert!(backend.open_outputs().is_empty());
}

#[derive(Debug, Clone)]
enum Step {
    SubscribeInput,
    UnsubscribeInput,
    SubscribeOutput,
    UnsubscribeOutput(usize),
    PlayFrames(usize),
    Tick,
}

fn step() -> impl proptest::strategy::Strategy<Value = Step> {
    use proptest::prelude::*;
    prop_oneof![
        Just(Step::SubscribeInput),
        Just(Step::UnsubscribeInput),
        Just(Step::SubscribeOutput),
        (0usize..8).prop_map(Step::UnsubscribeOutput),
        (0usize..8).prop_map(Step::PlayFrames),
        Just(Step::Tick),
    ]
}

proptest::proptest! {
    #[test]
    fn test_devices_follow_subscriptions(steps in proptest::collection::vec(step(), 1..60)) {
        let backend = backend();
        let (facade, _) = engine(&backend);

        let mut inputs = 0u32;
        let mut peers: Vec<SourceId> = Vec::new();
        let mut released: Vec<SourceId> = Vec::new();
        let start = Instant::now();

        for (n, step) in steps.into_iter().enumerate() {
            match step {
                Step::SubscribeInput => {
                    facade.subscribe_input().unwrap();
                    inputs += 1;
                }
                Step::UnsubscribeInput => {
                    facade.unsubscribe_input();
                    inputs = inputs.saturating_sub(1);
                }
                Step::SubscribeOutput => peers.push(facade.subscribe_output().unwrap()),
                Step::UnsubscribeOutput(i) => {
                    if peers.is_empty() {
                        continue;
                    }
                    let id = peers.remove(i % peers.len());
                    proptest::prop_assert!(facade.unsubscribe_output(id));
                    released.push(id);
                }
                Step::PlayFrames(i) => {
                    if let Some(&id) = peers.get(i % peers.len().max(1)) {
                        facade.play_frames(id, &[100; FRAME], FRAME, 1, 48000).unwrap();
                    }
                    for &id in &released {
                        proptest::prop_assert!(facade.play_frames(id, &[0; 2], 2, 1, 48000).is_err());
                    }
                }
                Step::Tick => {
                    backend.push_input("Mic", &frame_at(0.3));
                    facade.tick_now(start + TICK * n as u32);
                }
            }

            proptest::prop_assert_eq!(facade.input_subscribers(), inputs);
            proptest::prop_assert_eq!(facade.is_input_open(), inputs > 0);
            proptest::prop_assert_eq!(facade.output_subscribers(), peers.len());
            proptest::prop_assert_eq!(facade.is_output_ready(), !peers.is_empty());
            proptest::prop_assert_eq!(backend.open_inputs().len(), usize::from(inputs > 0));
            proptest::prop_assert!(backend.open_outputs().len() <= 1);
        }
    }
}
