use framesync::{FrameCounter, FrameStatus, FrameSync, MemorySettings, SettingsStore, SqliteSettings, SyncConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn unique(prefix: &str) -> String {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    format!("{}_{}_{}", prefix, std::process::id(), SEQ.fetch_add(1, Ordering::Relaxed))
}

fn enabled_settings() -> Arc<dyn SettingsStore> {
    Arc::new(MemorySettings::with("Framecount", true))
}

#[test]
fn receiver_sees_all_frames_sent_before_it_connected() {
    let name = unique("Alpha");
    let mut sender = FrameCounter::new(enabled_settings(), SyncConfig::default());
    sender.enable(&name).unwrap();
    for _ in 0..3 {
        sender.advance();
    }

    let mut receiver = FrameCounter::new(enabled_settings(), SyncConfig::default());
    receiver.enable(&name).unwrap();
    assert_eq!(receiver.poll(), FrameStatus::New);
    assert_eq!(receiver.frame_number(), 3);
    assert_eq!(receiver.fps_estimator().last_delta(), 3);
}

#[test]
fn one_new_frame_per_advance() {
    let name = unique("Lockstep");
    let mut sender = FrameCounter::new(enabled_settings(), SyncConfig::default());
    let mut receiver = FrameCounter::new(enabled_settings(), SyncConfig::default());
    sender.enable(&name).unwrap();
    receiver.enable(&name).unwrap();

    for n in 1..=50 {
        sender.advance();
        assert_eq!(sender.frame_number(), n);
        assert_eq!(receiver.poll(), FrameStatus::New);
        assert_eq!(receiver.poll(), FrameStatus::Unchanged);
        assert_eq!(receiver.poll(), FrameStatus::Unchanged);
        assert_eq!(receiver.frame_number(), n);
    }
}

#[test]
fn skipped_frames_are_reported_as_one_delta() {
    let name = unique("Burst");
    let mut sender = FrameCounter::new(enabled_settings(), SyncConfig::default());
    let mut receiver = FrameCounter::new(enabled_settings(), SyncConfig::default());
    sender.enable(&name).unwrap();
    receiver.enable(&name).unwrap();

    sender.advance();
    assert_eq!(receiver.poll(), FrameStatus::New);
    for _ in 0..7 {
        sender.advance();
    }
    assert_eq!(receiver.poll(), FrameStatus::New);
    assert_eq!(receiver.fps_estimator().last_delta(), 7);
    assert_eq!(receiver.frame_number(), 8);
}

#[test]
fn disabled_policy_makes_every_call_a_noop() {
    let name = unique("Off");
    let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
    let mut sender = FrameCounter::new(settings.clone(), SyncConfig::default());
    let mut receiver = FrameCounter::new(settings, SyncConfig::default());

    sender.enable(&name).unwrap();
    receiver.enable(&name).unwrap();
    assert!(!sender.has_semaphore());

    sender.advance();
    assert_eq!(sender.frame_number(), 0);
    for _ in 0..3 {
        assert_eq!(receiver.poll(), FrameStatus::Untracked);
    }
}

#[test]
fn reenabling_after_last_close_starts_from_scratch() {
    let name = unique("Restart");
    let mut sender = FrameCounter::new(enabled_settings(), SyncConfig::default());
    sender.enable(&name).unwrap();
    sender.advance();
    sender.advance();

    sender.disable();
    sender.set_frame_count(true).unwrap();
    sender.enable(&name).unwrap();
    assert_eq!(sender.frame_number(), 0);

    let mut receiver = FrameCounter::new(enabled_settings(), SyncConfig::default());
    receiver.enable(&name).unwrap();
    assert_eq!(receiver.poll(), FrameStatus::Untracked);

    sender.advance();
    assert_eq!(receiver.poll(), FrameStatus::New);
    assert_eq!(receiver.frame_number(), 1);
}

#[test]
fn switching_the_policy_off_tears_down_a_live_receiver() {
    let name = unique("Teardown");
    let mut sender = FrameSync::new(enabled_settings(), SyncConfig::default());
    let mut receiver = FrameSync::new(enabled_settings(), SyncConfig::default());
    sender.enable_frame_count(&name).unwrap();
    receiver.enable_frame_count(&name).unwrap();

    sender.advance_frame();
    assert_eq!(receiver.poll_new_frame(), FrameStatus::New);
    assert_eq!(receiver.poll_new_frame(), FrameStatus::Unchanged);

    receiver.set_global_frame_count_policy(false).unwrap();
    assert!(!receiver.is_frame_count_policy_enabled());
    sender.advance_frame();
    for _ in 0..3 {
        assert!(receiver.poll_new_frame().is_new());
    }
}

#[test]
fn policy_survives_a_restart_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("settings.db");

    {
        let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettings::open(&db).unwrap());
        let mut sync = FrameSync::new(settings, SyncConfig::default());
        assert!(!sync.is_frame_count_policy_enabled());
        sync.set_global_frame_count_policy(true).unwrap();
    }

    let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettings::open(&db).unwrap());
    let sync = FrameSync::new(settings, SyncConfig::default());
    assert!(sync.is_frame_count_policy_enabled());
}
