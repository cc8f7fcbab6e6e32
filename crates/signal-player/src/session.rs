//! Scoped ownership of the host audio engine.
//!
//! A [`DeviceSession`] is acquired when a player is built and released in `Drop`.
//! Players keep it behind an `Arc`; every stream opened through it holds the session
//! (directly or through its owning thread) until the stream is closed, so the engine
//! is never released while a stream is still open.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{AudioBackend, CpalBackend, ErrorFn, OutputStream, RenderFn, StreamParams};
use crate::error::Result;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Exclusive handle to one host audio engine.
pub struct DeviceSession {
    id: u64,
    backend: Box<dyn AudioBackend>,
}

impl DeviceSession {
    /// Acquire the default output device of the default host.
    ///
    /// Fails with [`crate::PlayerError::DeviceInit`] when no output device is present.
    pub fn open_default() -> Result<Self> {
        Ok(Self::with_backend(CpalBackend::open_default()?))
    }

    /// Wrap an already-initialized backend.
    pub fn with_backend(backend: impl AudioBackend + 'static) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session = id, backend = backend.name(), "audio session opened");
        Self {
            id,
            backend: Box::new(backend),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Open a stopped output stream on this session's engine.
    pub fn open_stream(
        &self,
        params: &StreamParams,
        render: RenderFn,
        on_error: ErrorFn,
    ) -> Result<Box<dyn OutputStream>> {
        self.backend.open_stream(params, render, on_error)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        tracing::debug!(session = self.id, backend = self.backend.name(), "audio session released");
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("backend", &self.backend.name())
            .finish()
    }
}
