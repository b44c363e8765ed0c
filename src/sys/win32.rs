use super::{CountingSemaphore, Disposition, ExclusiveLock, Namespace, Opened, WaitOutcome};
use crate::error::{Result, SyncError};
use std::time::Duration;
use windows::core::HSTRING;
use windows::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE, WAIT_ABANDONED, WAIT_FAILED, WAIT_OBJECT_0,
    WAIT_TIMEOUT,
};
use windows::Win32::System::Threading::{
    CreateMutexW, CreateSemaphoreW, ReleaseMutex, ReleaseSemaphore, WaitForSingleObject,
};

/// Kernel handle closed on drop. Closing never destroys an object other
/// processes still hold open.
struct OwnedHandle(HANDLE);

// Kernel handles are process-wide and usable from any thread
unsafe impl Send for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn disposition_after_create() -> Disposition {
    if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
        Disposition::Opened
    } else {
        Disposition::Created
    }
}

fn wait(handle: HANDLE, timeout: Duration) -> WaitOutcome {
    let millis = timeout.as_millis().min(u32::MAX as u128 - 1) as u32;
    let result = unsafe { WaitForSingleObject(handle, millis) };
    match result {
        r if r == WAIT_OBJECT_0 => WaitOutcome::Acquired,
        r if r == WAIT_TIMEOUT => WaitOutcome::TimedOut,
        r if r == WAIT_ABANDONED => WaitOutcome::Abandoned,
        r if r == WAIT_FAILED => WaitOutcome::Failed(format!("wait failed, error {}", unsafe { GetLastError() }.0)),
        other => WaitOutcome::Failed(format!("unexpected wait result 0x{:X}", other.0)),
    }
}

pub struct Win32Semaphore {
    name: String,
    handle: OwnedHandle,
}

impl CountingSemaphore for Win32Semaphore {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_acquire(&self) -> WaitOutcome {
        wait(self.handle.0, Duration::ZERO)
    }

    fn release(&self, count: i32) -> Result<i32> {
        let mut previous = 0i32;
        unsafe { ReleaseSemaphore(self.handle.0, count, Some(&mut previous as *mut i32)) }.map_err(|e| {
            SyncError::Release {
                name: self.name.clone(),
                reason: e.message().to_string(),
            }
        })?;
        Ok(previous)
    }
}

pub struct Win32Mutex {
    name: String,
    handle: OwnedHandle,
}

impl ExclusiveLock for Win32Mutex {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self, timeout: Duration) -> WaitOutcome {
        wait(self.handle.0, timeout)
    }

    fn release(&self) -> Result<()> {
        unsafe { ReleaseMutex(self.handle.0) }.map_err(|e| SyncError::Release {
            name: self.name.clone(),
            reason: e.message().to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsNamespace;

impl Namespace for OsNamespace {
    fn semaphore(&self, name: &str, initial: i32, max: i32) -> Result<Opened<Box<dyn CountingSemaphore>>> {
        let wide = HSTRING::from(name);
        let handle = unsafe { CreateSemaphoreW(None, initial, max, &wide) }.map_err(|e| SyncError::Create {
            name: name.to_string(),
            reason: e.message().to_string(),
        })?;
        let disposition = disposition_after_create();

        Ok(Opened {
            handle: Box::new(Win32Semaphore {
                name: name.to_string(),
                handle: OwnedHandle(handle),
            }),
            disposition,
        })
    }

    fn mutex(&self, name: &str) -> Result<Opened<Box<dyn ExclusiveLock>>> {
        let wide = HSTRING::from(name);
        let handle = unsafe { CreateMutexW(None, false, &wide) }.map_err(|e| SyncError::Create {
            name: name.to_string(),
            reason: e.message().to_string(),
        })?;
        let disposition = disposition_after_create();

        Ok(Opened {
            handle: Box::new(Win32Mutex {
                name: name.to_string(),
                handle: OwnedHandle(handle),
            }),
            disposition,
        })
    }
}
