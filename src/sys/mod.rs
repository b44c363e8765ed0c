//! Named cross-process synchronization objects.
//!
//! Every participant addresses the same object by name. On Windows these are
//! kernel semaphores and mutexes. Elsewhere they are emulated with a small
//! memory-mapped segment per name, reference counted through `flock` so the
//! last closer frees the name.

use crate::error::Result;
use std::time::Duration;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod win32;

#[cfg(unix)]
pub use self::unix::OsNamespace;
#[cfg(windows)]
pub use self::win32::OsNamespace;

/// Result of waiting on a named object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Acquired,
    TimedOut,
    /// The previous owner died while holding it. The caller now owns it.
    Abandoned,
    Failed(String),
}

/// Whether create-or-open made a new object or found one already shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Created,
    Opened,
}

pub struct Opened<T> {
    pub handle: T,
    pub disposition: Disposition,
}

/// A counting semaphore shared by name.
pub trait CountingSemaphore: Send {
    fn name(&self) -> &str;

    /// Decrements the count if it is above zero, without blocking.
    fn try_acquire(&self) -> WaitOutcome;

    /// Adds `count` and returns the count as it was before the release.
    fn release(&self, count: i32) -> Result<i32>;
}

/// An exclusive lock shared by name.
///
/// Ownership is tied to the handle (and on Windows, to the acquiring
/// thread), so release from the thread that acquired.
pub trait ExclusiveLock: Send {
    fn name(&self) -> &str;
    fn acquire(&self, timeout: Duration) -> WaitOutcome;
    fn release(&self) -> Result<()>;
}

/// Factory for named objects; one implementation per platform.
pub trait Namespace: Send + Sync {
    fn semaphore(&self, name: &str, initial: i32, max: i32) -> Result<Opened<Box<dyn CountingSemaphore>>>;
    fn mutex(&self, name: &str) -> Result<Opened<Box<dyn ExclusiveLock>>>;
}

/// Count every frame semaphore starts at. Senders take one and give back
/// two, receivers take one and give back one, so the count never drops
/// below this and a receiver reads the sender's frame count directly.
pub const SEMAPHORE_SEED: i32 = 1;

/// At 60fps `i32::MAX` frames is about 414 days of continuous sending.
pub const SEMAPHORE_MAX: i32 = i32::MAX;

/// Name of the frame count semaphore for a sender.
pub fn semaphore_name(sender: &str) -> String {
    format!("{}_Count_Semaphore", sender)
}

/// Name of the texture access mutex for a sender.
pub fn mutex_name(sender: &str) -> String {
    format!("{}_SpoutAccessMutex", sender)
}
