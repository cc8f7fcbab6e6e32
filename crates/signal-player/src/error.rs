//! Error taxonomy shared by the converters and both players.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors produced by sample conversion, device sessions and playback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayerError {
    /// A converter received the wrong sample representation.
    #[error("expected {expected} samples, got {actual}")]
    TypeKind {
        expected: &'static str,
        actual: &'static str,
    },

    /// The host audio subsystem could not be initialized.
    #[error("audio device init failed: {0}")]
    DeviceInit(String),

    /// A stream could not be opened with the requested parameters.
    #[error("stream open failed: {0}")]
    StreamOpen(String),

    /// Starting or pausing an open stream failed.
    #[error("stream control failed: {0}")]
    StreamControl(String),

    /// The engine reported a fault while driving a stream.
    #[error("stream callback fault: {0}")]
    CallbackFault(String),

    /// Configuration rejected before any stream was opened.
    #[error("invalid playback parameters: {0}")]
    InvalidParams(String),

    /// Operation not allowed in the player's current state.
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: &'static str },

    /// A background thread failed to spawn or panicked.
    #[error("playback thread error: {0}")]
    Thread(String),
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

/// Callback for errors raised on threads the caller does not own.
///
/// Invoked from background playback threads and from the engine's error path, so it
/// must not block.
pub type ErrorHook = Arc<dyn Fn(&PlayerError) + Send + Sync>;

/// Log a background error and forward it to the hook, if any.
pub(crate) fn report(hook: Option<&ErrorHook>, task: &'static str, err: &PlayerError) {
    tracing::error!(task, "{err}");
    if let Some(hook) = hook {
        hook(err);
    }
}

/// First engine fault seen on a stream. Later faults are logged but not kept.
#[derive(Debug, Default)]
pub(crate) struct FaultSlot {
    raised: AtomicBool,
    message: Mutex<Option<String>>,
}

impl FaultSlot {
    /// Record `message`; returns `true` if this was the first fault.
    pub(crate) fn raise(&self, message: String) -> bool {
        let mut slot = self.message.lock().unwrap_or_else(|e| e.into_inner());
        let first = slot.is_none();
        if first {
            *slot = Some(message);
        }
        self.raised.store(true, Ordering::Release);
        first
    }

    pub(crate) fn flag(&self) -> &AtomicBool {
        &self.raised
    }

    pub(crate) fn error(&self) -> Option<PlayerError> {
        self.message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .map(PlayerError::CallbackFault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_kind_message_names_both_kinds() {
        let err = PlayerError::TypeKind {
            expected: "integer",
            actual: "f32",
        };
        assert_eq!(err.to_string(), "expected integer samples, got f32");
    }

    #[test]
    fn invalid_state_message_names_op_and_state() {
        let err = PlayerError::InvalidState {
            op: "play",
            state: "stopped",
        };
        assert_eq!(err.to_string(), "cannot play while stopped");
    }

    #[test]
    fn fault_slot_keeps_first_message() {
        let slot = FaultSlot::default();
        assert!(!slot.flag().load(Ordering::Acquire));
        assert!(slot.error().is_none());

        assert!(slot.raise("underflow".into()));
        assert!(!slot.raise("device lost".into()));
        assert!(slot.flag().load(Ordering::Acquire));
        assert_eq!(slot.error(), Some(PlayerError::CallbackFault("underflow".into())));
    }

    #[test]
    fn report_forwards_to_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = seen.clone();
        let hook: ErrorHook = Arc::new(move |e| seen_hook.lock().unwrap().push(e.clone()));

        report(Some(&hook), "test", &PlayerError::StreamOpen("busy".into()));
        report(None, "test", &PlayerError::StreamOpen("ignored".into()));

        assert_eq!(*seen.lock().unwrap(), vec![PlayerError::StreamOpen("busy".into())]);
    }
}
