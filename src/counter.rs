use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::fps::FpsEstimator;
use crate::policy::FrameCountPolicy;
use crate::settings::SettingsStore;
use crate::sys::{
    self, CountingSemaphore, Disposition, Namespace, OsNamespace, WaitOutcome, SEMAPHORE_MAX, SEMAPHORE_SEED,
};
use crate::timer;
use crate::{log_debug, log_error, log_info, log_warn};
use std::sync::Arc;

/// What a receiver learned from polling the frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The sender has published at least one frame since the last poll.
    New,
    /// Same frame as last time; the texture does not need to be read.
    Unchanged,
    /// Frame counting is off, not connected yet, or the sender never counts.
    /// Treat the frame as new.
    Untracked,
}

impl FrameStatus {
    pub fn is_new(self) -> bool {
        !matches!(self, FrameStatus::Unchanged)
    }
}

/// Semaphore frame counter shared between one sender and its receivers.
///
/// The semaphore is created with a count of 1 and never drained below that
/// by anyone following the protocol: a sender takes one and gives back two,
/// a receiver takes one and gives back one. The count a receiver sees while
/// holding its one is therefore the number of frames the sender published.
///
/// Not internally synchronized. Callers wrap `advance` and `poll` in the
/// texture access lock together with the texture write or read.
pub struct FrameCounter {
    namespace: Arc<dyn Namespace>,
    policy: FrameCountPolicy,
    config: SyncConfig,
    semaphore: Option<Box<dyn CountingSemaphore>>,
    sender_name: Option<String>,
    frame_number: i64,
    last_count: i64,
    is_new_frame: bool,
    fps: FpsEstimator,
}

impl FrameCounter {
    pub fn new(settings: Arc<dyn SettingsStore>, config: SyncConfig) -> Self {
        Self::with_namespace(Arc::new(OsNamespace), settings, config)
    }

    pub fn with_namespace(
        namespace: Arc<dyn Namespace>,
        settings: Arc<dyn SettingsStore>,
        config: SyncConfig,
    ) -> Self {
        let policy = FrameCountPolicy::load(settings, &config.settings_key);
        let seed = timer::display_refresh_rate(config.fallback_refresh_rate);
        let fps = FpsEstimator::new(seed, config.fps_window, config.fps_damping);

        Self {
            namespace,
            policy,
            config,
            semaphore: None,
            sender_name: None,
            frame_number: 0,
            last_count: 0,
            is_new_frame: false,
            fps,
        }
    }

    /// Creates or opens the frame count semaphore for `sender`.
    ///
    /// Does nothing while counting is switched off. Finding the semaphore
    /// already created by the other side is the normal case.
    pub fn enable(&mut self, sender: &str) -> Result<()> {
        if !self.policy.global() {
            log_info!("Frame counting is not enabled in settings");
            return Ok(());
        }
        if self.policy.is_locally_disabled() {
            log_info!("Frame counting is disabled by this application");
            return Ok(());
        }
        if sender.is_empty() {
            log_warn!("Frame counting needs a sender name");
            return Err(SyncError::EmptyName);
        }

        self.reset_counts();

        if self.semaphore.is_some() && self.sender_name.as_deref() == Some(sender) {
            log_info!("Frame counting already enabled for [{}]", sender);
            return Ok(());
        }

        log_info!("Enabling frame counting for [{}]", sender);
        self.semaphore = None;
        self.sender_name = None;

        let name = sys::semaphore_name(sender);
        match self.namespace.semaphore(&name, SEMAPHORE_SEED, SEMAPHORE_MAX) {
            Ok(opened) => {
                match opened.disposition {
                    Disposition::Created => log_info!("    Semaphore [{}] created", name),
                    Disposition::Opened => log_info!("    Semaphore [{}] already exists", name),
                }
                self.semaphore = Some(opened.handle);
                self.sender_name = Some(sender.to_string());
                Ok(())
            }
            Err(e) => {
                log_error!("    {}", e);
                Err(e)
            }
        }
    }

    /// Closes the semaphore and keeps counting off for this application
    /// until the policy is switched on again.
    pub fn disable(&mut self) {
        self.cleanup();
        self.policy.disable_locally();
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_enabled()
    }

    /// Sets the persisted policy. Switching off tears down a live counter first.
    pub fn set_frame_count(&mut self, enabled: bool) -> Result<()> {
        if !enabled && self.is_enabled() {
            self.cleanup();
        }
        let persisted = self.policy.set_global(enabled);
        if let Err(e) = &persisted {
            log_error!("Failed to persist frame count setting: {}", e);
        }
        persisted
    }

    /// Signals a new frame. Sender side, once per texture update.
    pub fn advance(&mut self) {
        if !self.is_enabled() {
            return;
        }
        let Some(semaphore) = self.semaphore.as_ref() else {
            return;
        };

        match semaphore.try_acquire() {
            WaitOutcome::Acquired => {
                // One to undo the acquire, one for the new frame
                match semaphore.release(2) {
                    Ok(_) => {
                        self.frame_number += 1;
                        self.fps.record(1);
                    }
                    Err(e) => {
                        log_error!("Frame advance: {}", e);
                        give_back(semaphore.as_ref());
                    }
                }
            }
            WaitOutcome::TimedOut => {
                log_error!(
                    "Frame advance: [{}] has been drained, frame not counted",
                    semaphore.name()
                );
            }
            WaitOutcome::Abandoned => log_error!("Frame advance: [{}] abandoned", semaphore.name()),
            WaitOutcome::Failed(reason) => {
                log_error!("Frame advance: [{}] wait failed: {}", semaphore.name(), reason)
            }
        }
    }

    /// Checks whether the sender has published a frame since the last poll.
    /// Receiver side. Anything unexpected is reported as `Untracked` so the
    /// receiver keeps reading.
    pub fn poll(&mut self) -> FrameStatus {
        if !self.is_enabled() {
            return FrameStatus::Untracked;
        }
        let Some(semaphore) = self.semaphore.as_ref() else {
            return FrameStatus::Untracked;
        };

        let observed = match semaphore.try_acquire() {
            WaitOutcome::Acquired => match semaphore.release(1) {
                Ok(previous) => previous as i64,
                Err(e) => {
                    log_error!("Frame poll: {}", e);
                    give_back(semaphore.as_ref());
                    return FrameStatus::Untracked;
                }
            },
            WaitOutcome::TimedOut => {
                log_debug!("Frame poll: [{}] has no count", semaphore.name());
                return FrameStatus::Untracked;
            }
            WaitOutcome::Abandoned => {
                log_error!("Frame poll: [{}] abandoned", semaphore.name());
                return FrameStatus::Untracked;
            }
            WaitOutcome::Failed(reason) => {
                log_error!("Frame poll: [{}] wait failed: {}", semaphore.name(), reason);
                return FrameStatus::Untracked;
            }
        };

        self.frame_number = observed;

        // Senders that do not count frames leave the count at zero
        if observed == 0 {
            return FrameStatus::Untracked;
        }

        if observed == self.last_count {
            self.is_new_frame = false;
            return FrameStatus::Unchanged;
        }

        // A slow receiver can miss frames, so pass on how many went by
        self.fps.record(observed - self.last_count);
        self.last_count = observed;
        self.is_new_frame = true;
        FrameStatus::New
    }

    pub fn is_frame_new(&self) -> bool {
        self.is_new_frame
    }

    pub fn fps(&self) -> f64 {
        self.fps.fps()
    }

    pub fn fps_estimator(&self) -> &FpsEstimator {
        &self.fps
    }

    pub fn frame_number(&self) -> i64 {
        self.frame_number
    }

    pub fn name(&self) -> Option<&str> {
        self.sender_name.as_deref()
    }

    pub fn has_semaphore(&self) -> bool {
        self.semaphore.is_some()
    }

    fn reset_counts(&mut self) {
        self.frame_number = 0;
        self.last_count = 0;
        self.is_new_frame = false;
        self.fps
            .reset(timer::display_refresh_rate(self.config.fallback_refresh_rate));
    }

    fn cleanup(&mut self) {
        let Some(semaphore) = self.semaphore.take() else {
            return;
        };
        log_info!("Closing frame count semaphore [{}]", semaphore.name());
        // Other processes may keep the object alive; this only drops our handle
        drop(semaphore);
        self.sender_name = None;
        self.reset_counts();
    }
}

/// Returns the unit taken by a successful `try_acquire` whose paired
/// release failed. Without it the shared count stays one lower for good.
fn give_back(semaphore: &dyn CountingSemaphore) {
    if let Err(e) = semaphore.release(1) {
        log_error!(
            "[{}] count is now one below its seed and will stay there: {}",
            semaphore.name(),
            e
        );
    }
}
