//! Cross-process frame counting and texture access locks for shared GPU
//! textures.
//!
//! A sender publishing a shared texture and any number of receivers reading
//! it agree on two named objects derived from the sender name: a counting
//! semaphore that carries the frame count, and a mutex that serializes
//! texture access. [`FrameSync`] bundles both with a frame pacer.

pub mod logger;

pub mod access;
pub mod config;
pub mod counter;
pub mod error;
pub mod fps;
pub mod keyed;
pub mod pacer;
pub mod policy;
pub mod session;
pub mod settings;
pub mod sys;
pub mod timer;

pub use access::{Access, AccessLock};
pub use config::{ConfigFile, SyncConfig};
pub use counter::{FrameCounter, FrameStatus};
pub use error::SyncError;
pub use keyed::SharedTexture;
pub use pacer::FramePacer;
pub use policy::FrameCountPolicy;
pub use session::FrameSync;
pub use settings::{MemorySettings, SettingsStore, SqliteSettings};
