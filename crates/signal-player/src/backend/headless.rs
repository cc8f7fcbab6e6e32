//! Hardware-free backend driven by a paced software clock.
//!
//! Each stream gets a pacing thread that calls the render closure once per
//! `frames_per_buffer / sample_rate` seconds while started and discards the output.
//! Counters and fault injection are shared across clones so tests can observe what the
//! engine did.
//!
//! [`HeadlessBackend::with_engine_buffer_frames`] makes the engine pull a fixed buffer
//! size regardless of the request, the way real devices round up to their own minimum.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{AudioBackend, ErrorFn, OutputStream, RenderFn, StreamParams};
use crate::error::{PlayerError, Result};

const IDLE_TICK: Duration = Duration::from_millis(2);

/// Software output engine with no device behind it.
#[derive(Clone, Default)]
pub struct HeadlessBackend {
    shared: Arc<HeadlessShared>,
}

#[derive(Default)]
struct HeadlessShared {
    renders: AtomicU64,
    frames: AtomicU64,
    open_streams: AtomicUsize,
    fault_epoch: AtomicU64,
    fault_message: Mutex<String>,
    fail_next_open: Mutex<Option<String>>,
    /// 0 means "use the requested size".
    engine_buffer_frames: AtomicU32,
    last_audible_render: Mutex<Option<Instant>>,
    last_stop: Mutex<Option<Instant>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that pulls `frames` per callback no matter what a stream asks for.
    pub fn with_engine_buffer_frames(frames: u32) -> Self {
        let backend = Self::default();
        backend
            .shared
            .engine_buffer_frames
            .store(frames, Ordering::Release);
        backend
    }

    /// Total render closure invocations across all streams.
    pub fn render_count(&self) -> u64 {
        self.shared.renders.load(Ordering::Acquire)
    }

    /// Total frames rendered across all streams.
    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Streams currently open (not yet dropped).
    pub fn open_streams(&self) -> usize {
        self.shared.open_streams.load(Ordering::Acquire)
    }

    /// When a render last produced a non-silent buffer.
    pub fn last_audible_render(&self) -> Option<Instant> {
        *lock(&self.shared.last_audible_render)
    }

    /// When a stream was last stopped.
    pub fn last_stop(&self) -> Option<Instant> {
        *lock(&self.shared.last_stop)
    }

    /// Report an engine error to every open stream on its next tick.
    pub fn inject_fault(&self, message: impl Into<String>) {
        *lock(&self.shared.fault_message) = message.into();
        self.shared.fault_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Make the next `open_stream` call fail with [`PlayerError::StreamOpen`].
    pub fn fail_next_open(&self, message: impl Into<String>) {
        *lock(&self.shared.fail_next_open) = Some(message.into());
    }
}

impl AudioBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn open_stream(
        &self,
        params: &StreamParams,
        render: RenderFn,
        on_error: ErrorFn,
    ) -> Result<Box<dyn OutputStream>> {
        params.validate()?;
        if let Some(message) = lock(&self.shared.fail_next_open).take() {
            return Err(PlayerError::StreamOpen(message));
        }

        let control = Arc::new(Mutex::new(ClockState::default()));
        let clock = Clock {
            params: *params,
            control: control.clone(),
            shared: self.shared.clone(),
            seen_fault_epoch: self.shared.fault_epoch.load(Ordering::Acquire),
        };
        let thread = thread::Builder::new()
            .name("headless-clock".to_string())
            .spawn(move || clock.run(render, on_error))
            .map_err(|e| PlayerError::StreamOpen(format!("spawn clock thread: {e}")))?;

        self.shared.open_streams.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            channels = params.channels,
            rate_hz = params.sample_rate,
            frames_per_buffer = params.frames_per_buffer,
            mode = ?params.mode,
            "headless stream opened"
        );
        Ok(Box::new(HeadlessStream {
            control,
            shared: self.shared.clone(),
            thread: Some(thread),
        }))
    }
}

#[derive(Default)]
struct ClockState {
    running: bool,
    closed: bool,
}

struct Clock {
    params: StreamParams,
    control: Arc<Mutex<ClockState>>,
    shared: Arc<HeadlessShared>,
    seen_fault_epoch: u64,
}

impl Clock {
    fn run(mut self, mut render: RenderFn, mut on_error: ErrorFn) {
        let frames = match self.shared.engine_buffer_frames.load(Ordering::Acquire) {
            0 => self.params.frames_per_buffer,
            n => n,
        };
        let period =
            Duration::from_secs_f64(f64::from(frames) / f64::from(self.params.sample_rate));
        let mut buf = vec![0.0f32; frames as usize * usize::from(self.params.channels)];

        loop {
            let tick = Instant::now();
            {
                // Rendering under the lock makes `stop` wait out an in-flight callback.
                let state = lock(&self.control);
                if state.closed {
                    break;
                }
                if !state.running {
                    drop(state);
                    thread::sleep(IDLE_TICK);
                    continue;
                }

                let epoch = self.shared.fault_epoch.load(Ordering::Acquire);
                if epoch != self.seen_fault_epoch {
                    self.seen_fault_epoch = epoch;
                    let message = lock(&self.shared.fault_message).clone();
                    on_error(message);
                }

                render(&mut buf);
                if buf.iter().any(|s| *s != 0.0) {
                    *lock(&self.shared.last_audible_render) = Some(Instant::now());
                }
                self.shared.renders.fetch_add(1, Ordering::AcqRel);
                self.shared
                    .frames
                    .fetch_add(u64::from(frames), Ordering::AcqRel);
            }
            thread::sleep(period.saturating_sub(tick.elapsed()));
        }
    }
}

struct HeadlessStream {
    control: Arc<Mutex<ClockState>>,
    shared: Arc<HeadlessShared>,
    thread: Option<JoinHandle<()>>,
}

impl OutputStream for HeadlessStream {
    fn start(&self) -> Result<()> {
        lock(&self.control).running = true;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        lock(&self.control).running = false;
        *lock(&self.shared.last_stop) = Some(Instant::now());
        Ok(())
    }
}

impl Drop for HeadlessStream {
    fn drop(&mut self) {
        lock(&self.control).closed = true;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("headless clock thread panicked");
            }
        }
        self.shared.open_streams.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!("headless stream closed");
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StreamMode;
    use std::sync::atomic::AtomicBool;

    fn params(frames_per_buffer: u32) -> StreamParams {
        StreamParams {
            channels: 1,
            sample_rate: 8_000,
            frames_per_buffer,
            mode: StreamMode::Callback,
        }
    }

    fn noop_error() -> ErrorFn {
        Box::new(|_| {})
    }

    #[test]
    fn renders_only_while_started() {
        let backend = HeadlessBackend::new();
        let stream = backend
            .open_stream(&params(16), Box::new(|buf| buf.fill(0.0)), noop_error())
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(backend.render_count(), 0);

        stream.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        stream.stop().unwrap();
        let after_stop = backend.render_count();
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(backend.render_count(), after_stop);
        assert_eq!(backend.frames_rendered(), after_stop * 16);
    }

    #[test]
    fn drop_closes_stream() {
        let backend = HeadlessBackend::new();
        let stream = backend
            .open_stream(&params(16), Box::new(|_| {}), noop_error())
            .unwrap();
        assert_eq!(backend.open_streams(), 1);
        drop(stream);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn injected_fault_reaches_error_callback() {
        let backend = HeadlessBackend::new();
        let seen = Arc::new(AtomicBool::new(false));
        let seen_cb = seen.clone();
        let stream = backend
            .open_stream(
                &params(8),
                Box::new(|_| {}),
                Box::new(move |msg| {
                    assert_eq!(msg, "device unplugged");
                    seen_cb.store(true, Ordering::Release);
                }),
            )
            .unwrap();
        stream.start().unwrap();
        backend.inject_fault("device unplugged");

        let deadline = Instant::now() + Duration::from_secs(1);
        while !seen.load(Ordering::Acquire) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(seen.load(Ordering::Acquire));
    }

    #[test]
    fn fail_next_open_fails_once() {
        let backend = HeadlessBackend::new();
        backend.fail_next_open("busy");
        let err = backend
            .open_stream(&params(8), Box::new(|_| {}), noop_error())
            .err()
            .unwrap();
        assert_eq!(err, PlayerError::StreamOpen("busy".into()));
        assert!(
            backend
                .open_stream(&params(8), Box::new(|_| {}), noop_error())
                .is_ok()
        );
    }

    #[test]
    fn engine_buffer_overrides_requested_size() {
        let backend = HeadlessBackend::with_engine_buffer_frames(32);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = seen.clone();
        let stream = backend
            .open_stream(
                &params(8),
                Box::new(move |buf| {
                    seen_cb.store(buf.len(), Ordering::Release);
                    buf.fill(0.1);
                }),
                noop_error(),
            )
            .unwrap();
        stream.start().unwrap();
        while backend.render_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        stream.stop().unwrap();

        assert_eq!(seen.load(Ordering::Acquire), 32);
        assert!(backend.last_audible_render() <= backend.last_stop());
        assert!(backend.last_stop().is_some());
    }

    #[test]
    fn open_rejects_invalid_params() {
        let backend = HeadlessBackend::new();
        let err = backend
            .open_stream(&params(0), Box::new(|_| {}), noop_error())
            .err()
            .unwrap();
        assert!(matches!(err, PlayerError::InvalidParams(_)));
    }
}
