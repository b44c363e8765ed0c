use framesync::{Access, AccessLock, FrameSync, MemorySettings, SyncConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn unique(prefix: &str) -> String {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    format!("{}_{}_{}", prefix, std::process::id(), SEQ.fetch_add(1, Ordering::Relaxed))
}

#[test]
fn access_without_a_lock_is_immediate() {
    let sync = FrameSync::new(Arc::new(MemorySettings::new()), SyncConfig::default());
    let started = Instant::now();
    assert_eq!(sync.check_access(None), Access::NotApplicable);
    sync.allow_access(None);
    assert!(started.elapsed() < Duration::from_millis(20));
}

#[test]
fn repeated_cycles_leave_nothing_held() {
    let name = unique("Cycle");
    let config = SyncConfig::default();
    let mut first = AccessLock::new(&config);
    first.create(&name).unwrap();

    for _ in 0..1000 {
        assert_eq!(first.check_access(), Access::Granted);
        first.allow_access();
    }

    let mut second = AccessLock::new(&config);
    second.create(&name).unwrap();
    let started = Instant::now();
    assert_eq!(second.check_access(), Access::Granted);
    assert!(started.elapsed() < Duration::from_millis(20));
    second.allow_access();
}

#[test]
fn holder_blocks_others_until_timeout() {
    let name = unique("Busy");
    let config = SyncConfig::default();
    let mut holder = AccessLock::new(&config);
    holder.create(&name).unwrap();
    assert_eq!(holder.check_access(), Access::Granted);

    let waiter_name = name.clone();
    let waited = thread::spawn(move || {
        let mut waiter = AccessLock::new(&SyncConfig::default());
        waiter.create(&waiter_name).unwrap();
        let started = Instant::now();
        let access = waiter.check_access();
        (access, started.elapsed())
    })
    .join()
    .unwrap();

    assert_eq!(waited.0, Access::Denied);
    assert!(waited.1 >= Duration::from_millis(60));
    holder.allow_access();
}

#[test]
fn two_instances_never_hold_the_lock_together() {
    let name = unique("Beta");
    let inside = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicU64::new(0));
    let grants = Arc::new(AtomicU64::new(0));

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let name = name.clone();
            let inside = inside.clone();
            let overlaps = overlaps.clone();
            let grants = grants.clone();
            thread::spawn(move || {
                let mut lock = AccessLock::new(&SyncConfig::default());
                lock.create(&name).unwrap();
                let deadline = Instant::now() + Duration::from_secs(2);
                while Instant::now() < deadline {
                    if lock.check_access() == Access::Granted {
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        grants.fetch_add(1, Ordering::SeqCst);
                        inside.store(false, Ordering::SeqCst);
                        lock.allow_access();
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(grants.load(Ordering::SeqCst) > 0);
}

#[test]
fn nested_grants_need_one_release_each() {
    let name = unique("Nested");
    let mut holder = AccessLock::new(&SyncConfig::default());
    holder.create(&name).unwrap();
    assert_eq!(holder.check_access(), Access::Granted);
    assert_eq!(holder.check_access(), Access::Granted);
    holder.allow_access();

    let other = |name: String| {
        thread::spawn(move || {
            let mut lock = AccessLock::new(&SyncConfig::default());
            lock.create(&name).unwrap();
            let access = lock.check_access();
            if access == Access::Granted {
                lock.allow_access();
            }
            access
        })
        .join()
        .unwrap()
    };

    assert_eq!(other(name.clone()), Access::Denied);
    holder.allow_access();
    assert_eq!(other(name), Access::Granted);
}
