use crate::access::{Access, AccessLock};
use crate::config::SyncConfig;
use crate::counter::{FrameCounter, FrameStatus};
use crate::error::Result;
use crate::keyed::SharedTexture;
use crate::pacer::FramePacer;
use crate::settings::SettingsStore;
use crate::sys::{Namespace, OsNamespace};
use std::sync::Arc;

/// Frame synchronization for one sender or receiver.
///
/// Owns the frame counter, the texture access lock and the frame pacer for
/// a single sender name. A sender calls, per frame:
///
/// ```text
/// check_access -> write texture -> advance_frame -> allow_access -> hold_fps
/// ```
///
/// and a receiver:
///
/// ```text
/// check_access -> poll_new_frame -> read texture if new -> allow_access
/// ```
pub struct FrameSync {
    counter: FrameCounter,
    access: AccessLock,
    pacer: FramePacer,
}

impl FrameSync {
    pub fn new(settings: Arc<dyn SettingsStore>, config: SyncConfig) -> Self {
        Self::with_namespace(Arc::new(OsNamespace), settings, config)
    }

    pub fn with_namespace(
        namespace: Arc<dyn Namespace>,
        settings: Arc<dyn SettingsStore>,
        config: SyncConfig,
    ) -> Self {
        let access = AccessLock::with_namespace(namespace.clone(), &config);
        Self {
            counter: FrameCounter::with_namespace(namespace, settings, config),
            access,
            pacer: FramePacer::new(),
        }
    }

    pub fn enable_frame_count(&mut self, sender: &str) -> Result<()> {
        self.counter.enable(sender)
    }

    pub fn disable_frame_count(&mut self) {
        self.counter.disable();
    }

    pub fn advance_frame(&mut self) {
        self.counter.advance();
    }

    pub fn poll_new_frame(&mut self) -> FrameStatus {
        self.counter.poll()
    }

    pub fn is_frame_new(&self) -> bool {
        self.counter.is_frame_new()
    }

    pub fn fps(&self) -> f64 {
        self.counter.fps()
    }

    pub fn frame_number(&self) -> i64 {
        self.counter.frame_number()
    }

    /// Persists the switch for every application of this user.
    pub fn set_global_frame_count_policy(&mut self, enabled: bool) -> Result<()> {
        self.counter.set_frame_count(enabled)
    }

    pub fn is_frame_count_policy_enabled(&self) -> bool {
        self.counter.is_enabled()
    }

    pub fn create_access_lock(&mut self, sender: &str) -> Result<()> {
        self.access.create(sender)
    }

    pub fn close_access_lock(&mut self) {
        self.access.close();
    }

    /// Blocks up to the access timeout. `Granted` must be paired with
    /// [`FrameSync::allow_access`] on the same thread.
    pub fn check_access(&self, texture: Option<&dyn SharedTexture>) -> Access {
        self.access.check_texture_access(texture)
    }

    pub fn allow_access(&self, texture: Option<&dyn SharedTexture>) {
        self.access.allow_texture_access(texture);
    }

    pub fn hold_fps(&mut self, fps: i32) {
        self.pacer.hold_fps(fps);
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        self.access.close();
    }
}
