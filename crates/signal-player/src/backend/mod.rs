//! Stream backends: the seam between the players and the host audio engine.
//!
//! A backend opens output streams that pull interleaved `f32` samples from a
//! render closure on the engine's own driving thread. Two implementations:
//! - [`CpalBackend`]: the host's default output device via CPAL
//! - [`HeadlessBackend`]: a paced software clock with no hardware, for tests and CI

mod cpal_backend;
mod headless;

pub use cpal_backend::CpalBackend;
pub use headless::HeadlessBackend;

use crate::error::{PlayerError, Result};

/// Render closure invoked by the engine to fill an interleaved output buffer.
///
/// Must fill the whole slice, run in bounded time and never block.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Invoked by the engine when the stream reports an error status.
pub type ErrorFn = Box<dyn FnMut(String) + Send + 'static>;

/// How a stream is fed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// Samples are queued by a writer that blocks until they are consumed.
    BlockingWrite,
    /// Samples are produced on demand by a caller-supplied producer.
    Callback,
}

/// Shape of an output stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamParams {
    pub channels: u16,
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
    pub mode: StreamMode,
}

impl StreamParams {
    /// Reject shapes no engine can open, before touching the device.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(PlayerError::InvalidParams("channel count must be positive".into()));
        }
        if self.sample_rate == 0 {
            return Err(PlayerError::InvalidParams("sample rate must be positive".into()));
        }
        if self.frames_per_buffer == 0 {
            return Err(PlayerError::InvalidParams(
                "frames per buffer must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Samples in one engine buffer (frames times channels).
    pub fn buffer_samples(&self) -> usize {
        self.frames_per_buffer as usize * self.channels as usize
    }
}

/// An open output stream. Dropping it closes the stream.
pub trait OutputStream {
    /// Start (or resume) invoking the render closure.
    fn start(&self) -> Result<()>;

    /// Stop invoking the render closure. The stream stays open.
    fn stop(&self) -> Result<()>;
}

/// Host audio engine handle that can open output streams.
pub trait AudioBackend: Send + Sync {
    /// Human-readable name of the backend/device, for logs.
    fn name(&self) -> &str;

    /// Open a stopped output stream; call [`OutputStream::start`] to begin rendering.
    fn open_stream(
        &self,
        params: &StreamParams,
        render: RenderFn,
        on_error: ErrorFn,
    ) -> Result<Box<dyn OutputStream>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StreamParams {
        StreamParams {
            channels: 1,
            sample_rate: 48_000,
            frames_per_buffer: 128,
            mode: StreamMode::Callback,
        }
    }

    #[test]
    fn validate_accepts_positive_shape() {
        assert!(params().validate().is_ok());
        assert_eq!(params().buffer_samples(), 128);
    }

    #[test]
    fn validate_rejects_zero_fields() {
        let mut p = params();
        p.channels = 0;
        assert!(matches!(p.validate(), Err(PlayerError::InvalidParams(_))));

        let mut p = params();
        p.sample_rate = 0;
        assert!(matches!(p.validate(), Err(PlayerError::InvalidParams(_))));

        let mut p = params();
        p.frames_per_buffer = 0;
        assert!(matches!(p.validate(), Err(PlayerError::InvalidParams(_))));
    }
}
