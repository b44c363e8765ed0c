//! Access control for textures that carry their own keyed mutex.
//!
//! A shared texture created with the keyed mutex flag is locked through the
//! texture itself instead of the named access mutex. Only key 0 is used.

use crate::access::Access;
use crate::error::Result;
use crate::sys::WaitOutcome;
use crate::{log_debug, log_error};
use std::time::Duration;

/// The key both sides acquire and release with.
pub const SHARED_KEY: u64 = 0;

/// A shared texture as far as access control is concerned.
pub trait SharedTexture {
    /// True when the texture was created with its own keyed mutex.
    fn is_keyed_mutex(&self) -> bool;
    fn acquire_sync(&self, key: u64, timeout: Duration) -> WaitOutcome;
    fn release_sync(&self, key: u64) -> Result<()>;
}

/// Takes the texture's keyed mutex. On any failure the key is released
/// again so a stuck acquire cannot leave the texture locked.
pub fn check_keyed_access(texture: &dyn SharedTexture, timeout: Duration) -> Access {
    match texture.acquire_sync(SHARED_KEY, timeout) {
        WaitOutcome::Acquired => Access::Granted,
        outcome => {
            match outcome {
                WaitOutcome::TimedOut => log_debug!("Keyed mutex timed out"),
                WaitOutcome::Abandoned => log_error!("Keyed mutex abandoned"),
                WaitOutcome::Failed(reason) => log_error!("Keyed mutex failed: {}", reason),
                WaitOutcome::Acquired => {}
            }
            if let Err(e) = texture.release_sync(SHARED_KEY) {
                log_debug!("Keyed mutex release after failed acquire: {}", e);
            }
            Access::Denied
        }
    }
}

pub fn allow_keyed_access(texture: &dyn SharedTexture) {
    if let Err(e) = texture.release_sync(SHARED_KEY) {
        log_debug!("Keyed mutex release: {}", e);
    }
}

#[cfg(windows)]
mod d3d11 {
    use super::SharedTexture;
    use crate::error::{Result, SyncError};
    use crate::sys::WaitOutcome;
    use std::time::Duration;
    use windows::core::Interface;
    use windows::Win32::Foundation::{WAIT_ABANDONED, WAIT_TIMEOUT};
    use windows::Win32::Graphics::Direct3D11::{
        ID3D11Texture2D, D3D11_RESOURCE_MISC_SHARED_KEYEDMUTEX, D3D11_TEXTURE2D_DESC,
    };
    use windows::Win32::Graphics::Dxgi::IDXGIKeyedMutex;

    impl SharedTexture for ID3D11Texture2D {
        fn is_keyed_mutex(&self) -> bool {
            let mut desc = D3D11_TEXTURE2D_DESC::default();
            unsafe { self.GetDesc(&mut desc) };
            desc.MiscFlags & D3D11_RESOURCE_MISC_SHARED_KEYEDMUTEX.0 as u32 != 0
        }

        fn acquire_sync(&self, key: u64, timeout: Duration) -> WaitOutcome {
            let keyed: IDXGIKeyedMutex = match self.cast() {
                Ok(keyed) => keyed,
                Err(e) => return WaitOutcome::Failed(format!("no keyed mutex: {}", e)),
            };
            let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
            // Timeout and abandon come back as success codes, so read the raw HRESULT
            let hr = unsafe { (keyed.vtable().AcquireSync)(keyed.as_raw(), key, millis) };
            if hr.0 == WAIT_TIMEOUT.0 as i32 {
                WaitOutcome::TimedOut
            } else if hr.0 == WAIT_ABANDONED.0 as i32 {
                WaitOutcome::Abandoned
            } else if hr.is_ok() {
                WaitOutcome::Acquired
            } else {
                WaitOutcome::Failed(hr.message())
            }
        }

        fn release_sync(&self, key: u64) -> Result<()> {
            let keyed: IDXGIKeyedMutex = self.cast().map_err(|e| SyncError::Release {
                name: "keyed mutex".to_string(),
                reason: e.to_string(),
            })?;
            unsafe { keyed.ReleaseSync(key) }.map_err(|e| SyncError::Release {
                name: "keyed mutex".to_string(),
                reason: e.to_string(),
            })
        }
    }
}
