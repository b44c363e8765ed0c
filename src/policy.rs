use crate::error::Result;
use crate::settings::SettingsStore;
use std::sync::Arc;

/// The frame counting switch.
///
/// The global half is persisted in a [`SettingsStore`] and shared by every
/// application of the user. The local half lets one application opt out
/// until it enables counting again, without touching the stored value.
pub struct FrameCountPolicy {
    store: Arc<dyn SettingsStore>,
    key: String,
    global: bool,
    locally_disabled: bool,
}

impl FrameCountPolicy {
    /// Reads the stored switch. A missing value means counting is off.
    pub fn load(store: Arc<dyn SettingsStore>, key: &str) -> Self {
        let global = store.read_bool(key).unwrap_or(false);
        Self {
            store,
            key: key.to_string(),
            global,
            locally_disabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.global && !self.locally_disabled
    }

    pub fn global(&self) -> bool {
        self.global
    }

    pub fn is_locally_disabled(&self) -> bool {
        self.locally_disabled
    }

    pub fn disable_locally(&mut self) {
        self.locally_disabled = true;
    }

    /// Flips the global switch and clears the local override. The in-memory
    /// state changes even when persisting fails.
    pub fn set_global(&mut self, enabled: bool) -> Result<()> {
        self.global = enabled;
        self.locally_disabled = false;
        self.store.write_bool(&self.key, enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    #[test]
    fn missing_setting_means_disabled() {
        let policy = FrameCountPolicy::load(Arc::new(MemorySettings::new()), "Framecount");
        assert!(!policy.global());
        assert!(!policy.is_enabled());
    }

    #[test]
    fn local_override_masks_global() {
        let store = Arc::new(MemorySettings::with("Framecount", true));
        let mut policy = FrameCountPolicy::load(store, "Framecount");
        assert!(policy.is_enabled());

        policy.disable_locally();
        assert!(policy.global());
        assert!(!policy.is_enabled());

        policy.set_global(true).unwrap();
        assert!(policy.is_enabled());
    }

    #[test]
    fn set_global_persists() {
        let store = Arc::new(MemorySettings::new());
        let mut policy = FrameCountPolicy::load(store.clone(), "Framecount");
        policy.set_global(true).unwrap();
        assert_eq!(store.read_bool("Framecount"), Some(true));
        policy.set_global(false).unwrap();
        assert_eq!(store.read_bool("Framecount"), Some(false));
    }
}
