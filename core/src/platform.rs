//! Device restrictions requested while a voting session is locked.
//!
//! All of these are best-effort. A platform that cannot lock orientation or
//! intercept the back button reports an error, the session logs it and the
//! vote proceeds.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("platform call failed: {0}")]
    Failed(String),
}

/// Hooks the host exposes to a locked voting session.
pub trait PlatformHooks: Send + Sync {
    fn lock_portrait(&self) -> Result<(), PlatformError>;
    fn unlock_orientation(&self) -> Result<(), PlatformError>;
    /// Start or stop delivering lifecycle events to the session.
    fn watch_lifecycle(&self, enabled: bool) -> Result<(), PlatformError>;
    /// Start or stop routing hardware back presses to the session.
    fn intercept_back(&self, enabled: bool) -> Result<(), PlatformError>;
}

/// Accepts every request and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlatform;

impl PlatformHooks for NoopPlatform {
    fn lock_portrait(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn unlock_orientation(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn watch_lifecycle(&self, _enabled: bool) -> Result<(), PlatformError> {
        Ok(())
    }

    fn intercept_back(&self, _enabled: bool) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// A hook call, as seen by [`RecordingPlatform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCall {
    LockPortrait,
    UnlockOrientation,
    WatchLifecycle(bool),
    InterceptBack(bool),
}

/// Records every call. Optionally fails orientation calls, which lets
/// embedders and tests exercise unsupported devices.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    orientation_unsupported: bool,
}

impl RecordingPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn without_orientation_lock() -> Self {
        Self {
            calls: Mutex::default(),
            orientation_unsupported: true,
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: PlatformCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn orientation(&self, call: PlatformCall) -> Result<(), PlatformError> {
        self.record(call);
        if self.orientation_unsupported {
            Err(PlatformError::Unsupported("orientation lock"))
        } else {
            Ok(())
        }
    }
}

impl PlatformHooks for RecordingPlatform {
    fn lock_portrait(&self) -> Result<(), PlatformError> {
        self.orientation(PlatformCall::LockPortrait)
    }

    fn unlock_orientation(&self) -> Result<(), PlatformError> {
        self.orientation(PlatformCall::UnlockOrientation)
    }

    fn watch_lifecycle(&self, enabled: bool) -> Result<(), PlatformError> {
        self.record(PlatformCall::WatchLifecycle(enabled));
        Ok(())
    }

    fn intercept_back(&self, enabled: bool) -> Result<(), PlatformError> {
        self.record(PlatformCall::InterceptBack(enabled));
        Ok(())
    }
}
