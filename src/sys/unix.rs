use super::{CountingSemaphore, Disposition, ExclusiveLock, Namespace, Opened, WaitOutcome};
use crate::error::{Result, SyncError};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const SEGMENT_MAGIC: u64 = 0x4652_4D53_594E_4331; // "FRMSYNC1"
const KIND_SEMAPHORE: u32 = 1;
const KIND_MUTEX: u32 = 2;

/// Layout of the shared segment behind every named object.
#[repr(C)]
struct Segment {
    magic: AtomicU64,
    kind: AtomicU32,
    _reserved: u32,
    /// Semaphore count, or the owner's recursion depth for a mutex.
    count: AtomicI64,
    max: AtomicI64,
    /// Mutex owner as `pid << 32 | handle token`, zero when free.
    owner: AtomicU64,
}

const SEGMENT_LEN: u64 = std::mem::size_of::<Segment>() as u64;

static NEXT_TOKEN: AtomicU32 = AtomicU32::new(1);

/// Directory shared by every process of this user. `FRAMESYNC_RUNTIME_DIR`
/// overrides it, which all participants must then agree on.
fn runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("FRAMESYNC_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir).join("framesync");
    }
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        return shm.join("framesync");
    }
    std::env::temp_dir().join("framesync")
}

/// Maps an object name onto a single path component, reversibly.
fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => stem.push(byte as char),
            other => stem.push_str(&format!("%{:02X}", other)),
        }
    }
    stem
}

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    loop {
        if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
        Ok(()) => Ok(true),
        Err(e) if e.raw_os_error() == Some(libc::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e),
    }
}

fn process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    if unsafe { libc::kill(pid as libc::pid_t, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// One process's view of a named segment.
///
/// Every handle keeps a shared `flock` on the segment file. Whoever can
/// upgrade to an exclusive lock is the only holder left: on open that means
/// the contents are stale and get reinitialized, on close the file is
/// unlinked. A per-name guard file serializes open and close.
struct SharedSegment {
    name: String,
    guard_path: PathBuf,
    segment_path: PathBuf,
    file: File,
    map: MmapMut,
}

impl SharedSegment {
    fn open(name: &str, kind: u32, init: impl FnOnce(&Segment)) -> Result<(Self, Disposition)> {
        let create_err = |reason: String| SyncError::Create {
            name: name.to_string(),
            reason,
        };

        let dir = runtime_dir();
        fs::create_dir_all(&dir).map_err(|e| create_err(format!("{}: {}", dir.display(), e)))?;
        let stem = file_stem(name);
        let guard_path = dir.join(format!("{}.lock", stem));
        let segment_path = dir.join(format!("{}.shm", stem));

        let guard = open_rw(&guard_path).map_err(|e| create_err(e.to_string()))?;
        flock(&guard, libc::LOCK_EX).map_err(|e| create_err(e.to_string()))?;

        let file = open_rw(&segment_path).map_err(|e| create_err(e.to_string()))?;
        let sole_holder = try_flock_exclusive(&file).map_err(|e| create_err(e.to_string()))?;

        let disposition = if sole_holder {
            // Fresh, or left behind by processes that are gone: start over
            file.set_len(0).map_err(|e| create_err(e.to_string()))?;
            file.set_len(SEGMENT_LEN).map_err(|e| create_err(e.to_string()))?;
            Disposition::Created
        } else {
            let len = file.metadata().map_err(|e| create_err(e.to_string()))?.len();
            if len < SEGMENT_LEN {
                return Err(create_err("shared segment is truncated".to_string()));
            }
            Disposition::Opened
        };

        let map = unsafe { MmapOptions::new().len(SEGMENT_LEN as usize).map_mut(&file) }
            .map_err(|e| create_err(e.to_string()))?;

        let header = header_of(&map);
        match disposition {
            Disposition::Created => {
                header.kind.store(kind, Ordering::Relaxed);
                header.owner.store(0, Ordering::Relaxed);
                init(header);
                header.magic.store(SEGMENT_MAGIC, Ordering::Release);
            }
            Disposition::Opened => {
                if header.magic.load(Ordering::Acquire) != SEGMENT_MAGIC {
                    return Err(create_err("shared segment is not initialized".to_string()));
                }
                if header.kind.load(Ordering::Relaxed) != kind {
                    return Err(create_err("name is in use by a different kind of object".to_string()));
                }
            }
        }

        flock(&file, libc::LOCK_SH).map_err(|e| create_err(e.to_string()))?;
        drop(guard);

        let segment = Self {
            name: name.to_string(),
            guard_path,
            segment_path,
            file,
            map,
        };
        Ok((segment, disposition))
    }

    fn header(&self) -> &Segment {
        header_of(&self.map)
    }
}

fn header_of(map: &MmapMut) -> &Segment {
    // The mapping is page aligned and exactly one Segment long
    unsafe { &*(map.as_ptr() as *const Segment) }
}

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).create(true).open(path)
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        let guard = open_rw(&self.guard_path).ok();
        if let Some(guard) = guard.as_ref() {
            let _ = flock(guard, libc::LOCK_EX);
        }

        let _ = flock(&self.file, libc::LOCK_UN);
        if guard.is_some() && matches!(try_flock_exclusive(&self.file), Ok(true)) {
            if let Err(e) = fs::remove_file(&self.segment_path) {
                crate::log_debug!("Could not unlink [{}]: {}", self.name, e);
            }
        }
    }
}

pub struct ShmSemaphore {
    segment: SharedSegment,
}

impl CountingSemaphore for ShmSemaphore {
    fn name(&self) -> &str {
        &self.segment.name
    }

    fn try_acquire(&self) -> WaitOutcome {
        let count = &self.segment.header().count;
        let mut current = count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return WaitOutcome::TimedOut;
            }
            match count.compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return WaitOutcome::Acquired,
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, release_count: i32) -> Result<i32> {
        let release_err = |reason: &str| SyncError::Release {
            name: self.segment.name.clone(),
            reason: reason.to_string(),
        };
        if release_count <= 0 {
            return Err(release_err("release count must be positive"));
        }

        let header = self.segment.header();
        let max = header.max.load(Ordering::Relaxed);
        let mut current = header.count.load(Ordering::Acquire);
        loop {
            let next = current + release_count as i64;
            if next > max {
                return Err(release_err("release would exceed the maximum count"));
            }
            match header
                .count
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(previous) => return Ok(previous as i32),
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct ShmMutex {
    segment: SharedSegment,
    owner_tag: u64,
}

impl ShmMutex {
    fn pid_of(tag: u64) -> u32 {
        (tag >> 32) as u32
    }
}

impl ExclusiveLock for ShmMutex {
    fn name(&self) -> &str {
        &self.segment.name
    }

    fn acquire(&self, timeout: Duration) -> WaitOutcome {
        let header = self.segment.header();
        let owner = &header.owner;
        let depth = &header.count;
        let deadline = Instant::now() + timeout;
        let mut spins = 0u32;

        loop {
            match owner.compare_exchange(0, self.owner_tag, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    depth.store(1, Ordering::Relaxed);
                    return WaitOutcome::Acquired;
                }
                // Recursive like a kernel mutex: one release per acquire
                Err(current) if current == self.owner_tag => {
                    depth.fetch_add(1, Ordering::Relaxed);
                    return WaitOutcome::Acquired;
                }
                Err(current) => {
                    if !process_alive(Self::pid_of(current))
                        && owner
                            .compare_exchange(current, self.owner_tag, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                    {
                        depth.store(1, Ordering::Relaxed);
                        return WaitOutcome::Abandoned;
                    }
                }
            }

            if Instant::now() >= deadline {
                return WaitOutcome::TimedOut;
            }
            if spins < 64 {
                spins += 1;
                std::thread::yield_now();
            } else {
                std::thread::sleep(Duration::from_micros(200));
            }
        }
    }

    fn release(&self) -> Result<()> {
        let header = self.segment.header();
        if header.owner.load(Ordering::Acquire) != self.owner_tag {
            return Err(SyncError::NotOwner(self.segment.name.clone()));
        }
        // Only the owner touches the depth while it holds the lock
        if header.count.fetch_sub(1, Ordering::Relaxed) <= 1 {
            header.count.store(0, Ordering::Relaxed);
            header.owner.store(0, Ordering::Release);
        }
        Ok(())
    }
}

impl Drop for ShmMutex {
    fn drop(&mut self) {
        // A live pid never looks abandoned, so a dropped holder must let go itself
        let header = self.segment.header();
        if header.owner.load(Ordering::Acquire) == self.owner_tag {
            header.count.store(0, Ordering::Relaxed);
            header.owner.store(0, Ordering::Release);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsNamespace;

impl Namespace for OsNamespace {
    fn semaphore(&self, name: &str, initial: i32, max: i32) -> Result<Opened<Box<dyn CountingSemaphore>>> {
        if initial < 0 || max <= 0 || initial > max {
            return Err(SyncError::Create {
                name: name.to_string(),
                reason: format!("invalid counts (initial {}, max {})", initial, max),
            });
        }

        let (segment, disposition) = SharedSegment::open(name, KIND_SEMAPHORE, |header| {
            header.count.store(initial as i64, Ordering::Relaxed);
            header.max.store(max as i64, Ordering::Relaxed);
        })?;

        Ok(Opened {
            handle: Box::new(ShmSemaphore { segment }),
            disposition,
        })
    }

    fn mutex(&self, name: &str) -> Result<Opened<Box<dyn ExclusiveLock>>> {
        let (segment, disposition) = SharedSegment::open(name, KIND_MUTEX, |header| {
            header.count.store(0, Ordering::Relaxed);
            header.max.store(1, Ordering::Relaxed);
        })?;

        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        let owner_tag = ((std::process::id() as u64) << 32) | token as u64;

        Ok(Opened {
            handle: Box::new(ShmMutex { segment, owner_tag }),
            disposition,
        })
    }
}
