use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::keyed::{self, SharedTexture};
use crate::sys::{self, Disposition, ExclusiveLock, Namespace, OsNamespace, WaitOutcome};
use crate::{log_debug, log_error, log_info, log_warn};
use std::sync::Arc;
use std::time::Duration;

/// Answer to a request for texture access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Another process holds the texture, or the lock is broken.
    Denied,
    /// No lock has been created, so there is nothing to wait for.
    NotApplicable,
}

impl Access {
    /// Whether the caller may touch the texture. Only `Granted` obliges the
    /// caller to hand access back afterwards.
    pub fn is_granted(self) -> bool {
        !matches!(self, Access::Denied)
    }
}

/// Named mutex guarding a sender's shared texture.
///
/// A sender and all of its receivers open the same mutex by name and wrap
/// every texture write or read in `check_access` / `allow_access`. A process
/// that cannot get the lock in time skips that frame.
pub struct AccessLock {
    namespace: Arc<dyn Namespace>,
    timeout: Duration,
    mutex: Option<Box<dyn ExclusiveLock>>,
}

impl AccessLock {
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_namespace(Arc::new(OsNamespace), config)
    }

    pub fn with_namespace(namespace: Arc<dyn Namespace>, config: &SyncConfig) -> Self {
        Self {
            namespace,
            timeout: config.access_timeout(),
            mutex: None,
        }
    }

    /// Creates or opens the access mutex for `sender`, replacing any handle
    /// already held. Nothing is acquired.
    pub fn create(&mut self, sender: &str) -> Result<()> {
        if sender.is_empty() {
            log_warn!("Access lock needs a sender name");
            return Err(SyncError::EmptyName);
        }
        self.close();

        let name = sys::mutex_name(sender);
        let opened = self.namespace.mutex(&name).map_err(|e| {
            log_error!("Access lock: {}", e);
            e
        })?;
        match opened.disposition {
            Disposition::Created => log_info!("Access mutex [{}] created", name),
            Disposition::Opened => log_info!("Access mutex [{}] already exists", name),
        }
        self.mutex = Some(opened.handle);
        Ok(())
    }

    /// Drops the handle. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if let Some(mutex) = self.mutex.take() {
            log_debug!("Closing access mutex [{}]", mutex.name());
        }
    }

    pub fn is_open(&self) -> bool {
        self.mutex.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.mutex.as_ref().map(|m| m.name())
    }

    /// Waits up to the access timeout for exclusive use of the texture.
    pub fn check_access(&self) -> Access {
        let Some(mutex) = self.mutex.as_ref() else {
            return Access::NotApplicable;
        };

        match mutex.acquire(self.timeout) {
            WaitOutcome::Acquired => Access::Granted,
            // Busy. The caller skips this frame.
            WaitOutcome::TimedOut => Access::Denied,
            WaitOutcome::Abandoned => {
                log_error!("Access mutex [{}] was abandoned", mutex.name());
                // We own it now; hand it straight back so the next wait succeeds
                if let Err(e) = mutex.release() {
                    log_debug!("Access mutex release after abandon: {}", e);
                }
                Access::Denied
            }
            WaitOutcome::Failed(reason) => {
                log_error!("Access mutex [{}] wait failed: {}", mutex.name(), reason);
                Access::Denied
            }
        }
    }

    /// Hands access back. Harmless when nothing is held.
    pub fn allow_access(&self) {
        if let Some(mutex) = self.mutex.as_ref() {
            if let Err(e) = mutex.release() {
                log_debug!("Access mutex release: {}", e);
            }
        }
    }

    /// Access for a specific texture. Textures with their own keyed mutex
    /// are locked through it and the named mutex is not touched.
    pub fn check_texture_access(&self, texture: Option<&dyn SharedTexture>) -> Access {
        match texture {
            Some(texture) if texture.is_keyed_mutex() => {
                keyed::check_keyed_access(texture, self.timeout)
            }
            _ => self.check_access(),
        }
    }

    pub fn allow_texture_access(&self, texture: Option<&dyn SharedTexture>) {
        match texture {
            Some(texture) if texture.is_keyed_mutex() => keyed::allow_keyed_access(texture),
            _ => self.allow_access(),
        }
    }
}
