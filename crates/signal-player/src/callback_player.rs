//! Stream audio produced on demand by a caller-supplied producer.
//!
//! ## Lifecycle
//! `Created → Opened → Streaming → Stopped`, and `Closed` on drop from any state.
//! - [`CallbackPlayer::new`] opens a mono callback stream right away (`Opened`).
//! - [`CallbackPlayer::play`] starts it and spawns a supervisor thread (`Streaming`).
//! - [`CallbackPlayer::stop`], the producer returning [`StreamFlow::Complete`], or an
//!   engine fault end streaming (`Stopped`).
//! - Dropping the player closes the stream, then releases the session.
//!
//! ## Real-time constraints
//! The producer runs on the engine's driving thread. The render path never allocates,
//! never waits on a condvar and reports faults through atomics. The supervisor only
//! polls an activity flag, so callers get a joinable handle without hooking the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::backend::{OutputStream, StreamMode, StreamParams};
use crate::config::PlayerConfig;
use crate::error::{ErrorHook, FaultSlot, PlayerError, Result};
use crate::handle::{PlaybackHandle, spawn_task};
use crate::session::DeviceSession;

/// What the producer wants after filling a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamFlow {
    /// Keep invoking the producer.
    Continue,
    /// Play this buffer, then go inactive. The producer is not invoked again.
    Complete,
}

/// Fills one buffer of mono samples per invocation.
///
/// `out.len()` is always the player's `frames_per_buffer`. Runs on the engine's
/// real-time thread: bounded time, no blocking.
pub trait Producer: Send + 'static {
    fn produce(&mut self, out: &mut [f32]) -> StreamFlow;
}

impl<F> Producer for F
where
    F: FnMut(&mut [f32]) -> StreamFlow + Send + 'static,
{
    fn produce(&mut self, out: &mut [f32]) -> StreamFlow {
        self(out)
    }
}

/// Observable lifecycle state of a [`CallbackPlayer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Opened,
    Streaming,
    Stopped,
}

impl PlayerState {
    fn name(self) -> &'static str {
        match self {
            PlayerState::Opened => "opened",
            PlayerState::Streaming => "streaming",
            PlayerState::Stopped => "stopped",
        }
    }
}

/// Flags shared by the render callback, the engine error callback, the player and the
/// supervisor.
#[derive(Debug, Default)]
struct Activity {
    /// The engine is driving the producer.
    active: AtomicBool,
    /// The producer must not be invoked again.
    halted: AtomicBool,
    fault: FaultSlot,
}

impl Activity {
    fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        self.active.store(false, Ordering::Release);
    }
}

/// Mono stream driven by a [`Producer`].
///
/// Field order matters: the stream is dropped before the session.
pub struct CallbackPlayer {
    stream: Option<Box<dyn OutputStream>>,
    activity: Arc<Activity>,
    state: PlayerState,
    sample_rate: u32,
    frames_per_buffer: u32,
    poll_interval: Duration,
    error_hook: Option<ErrorHook>,
    session: Arc<DeviceSession>,
}

impl CallbackPlayer {
    /// Open a mono callback stream on `session`.
    ///
    /// Fails with [`PlayerError::InvalidParams`] for a zero rate or buffer size and with
    /// [`PlayerError::StreamOpen`] when the engine rejects the stream. The session is
    /// released on failure.
    pub fn new(
        session: DeviceSession,
        producer: impl Producer,
        sample_rate: u32,
        frames_per_buffer: u32,
    ) -> Result<Self> {
        Self::with_config(session, producer, sample_rate, frames_per_buffer, PlayerConfig::default())
    }

    pub fn with_config(
        session: DeviceSession,
        producer: impl Producer,
        sample_rate: u32,
        frames_per_buffer: u32,
        config: PlayerConfig,
    ) -> Result<Self> {
        let params = StreamParams {
            channels: 1,
            sample_rate,
            frames_per_buffer,
            mode: StreamMode::Callback,
        };
        params.validate()?;
        if config.poll_interval.is_zero() {
            return Err(PlayerError::InvalidParams("poll interval must be positive".into()));
        }

        let activity = Arc::new(Activity::default());
        let mut renderer = Renderer::new(producer, frames_per_buffer as usize, activity.clone());
        let render = Box::new(move |out: &mut [f32]| renderer.render(out));

        let error_activity = activity.clone();
        let on_error = Box::new(move |message: String| {
            error_activity.fault.raise(message);
            error_activity.halt();
        });

        let stream = session.open_stream(&params, render, on_error)?;
        tracing::info!(
            session = session.id(),
            rate_hz = sample_rate,
            frames_per_buffer,
            "callback stream opened"
        );

        Ok(Self {
            stream: Some(stream),
            activity,
            state: PlayerState::Opened,
            sample_rate,
            frames_per_buffer,
            poll_interval: config.poll_interval,
            error_hook: None,
            session: Arc::new(session),
        })
    }

    /// Player on the default output device.
    pub fn open_default(
        producer: impl Producer,
        sample_rate: u32,
        frames_per_buffer: u32,
    ) -> Result<Self> {
        Self::new(DeviceSession::open_default()?, producer, sample_rate, frames_per_buffer)
    }

    /// Receive faults raised while streaming (reported by the supervisor thread).
    pub fn set_error_hook(&mut self, hook: impl Fn(&PlayerError) + Send + Sync + 'static) {
        self.error_hook = Some(Arc::new(hook));
    }

    /// Start the stream and return a handle to the supervisor thread.
    ///
    /// Returns immediately. The handle finishes once the stream is inactive, with
    /// [`PlayerError::CallbackFault`] if the engine reported a fault.
    pub fn play(&mut self) -> Result<PlaybackHandle> {
        let state = self.state();
        if state != PlayerState::Opened {
            return Err(PlayerError::InvalidState {
                op: "play",
                state: state.name(),
            });
        }
        let Some(stream) = self.stream.as_ref() else {
            return Err(PlayerError::InvalidState {
                op: "play",
                state: "closed",
            });
        };

        // Active before start so the supervisor cannot observe a stale `false`.
        self.activity.active.store(true, Ordering::Release);
        if let Err(e) = stream.start() {
            self.activity.active.store(false, Ordering::Release);
            return Err(e);
        }
        self.state = PlayerState::Streaming;
        tracing::debug!(session = self.session.id(), "callback stream started");

        let activity = self.activity.clone();
        let poll_interval = self.poll_interval;
        let session_id = self.session.id();
        Ok(spawn_task(
            "callback-supervisor",
            "callback playback",
            self.error_hook.clone(),
            move || supervise(&activity, poll_interval, session_id),
        ))
    }

    /// Stop the engine from invoking the producer.
    ///
    /// Does not wait for the supervisor; it notices on its next poll. Stopping a player
    /// that never played moves it straight to `Stopped`; stopping again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let was = self.state;
        self.activity.halt();
        self.state = PlayerState::Stopped;

        if was != PlayerState::Streaming {
            return Ok(());
        }
        tracing::debug!(session = self.session.id(), "callback stream stopped");
        match self.stream.as_ref() {
            Some(stream) => stream.stop(),
            None => Ok(()),
        }
    }

    /// Current state; a stream that finished or faulted on its own reports `Stopped`.
    pub fn state(&self) -> PlayerState {
        match self.state {
            PlayerState::Streaming if !self.is_active() => PlayerState::Stopped,
            state => state,
        }
    }

    /// Whether the engine is still driving the producer.
    pub fn is_active(&self) -> bool {
        self.activity.active.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames_per_buffer(&self) -> u32 {
        self.frames_per_buffer
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }
}

impl Drop for CallbackPlayer {
    fn drop(&mut self) {
        self.activity.halt();
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!(session = self.session.id(), "callback stream closed");
        }
    }
}

/// Poll until the stream goes inactive, then report how it ended.
fn supervise(activity: &Activity, poll_interval: Duration, session_id: u64) -> Result<()> {
    while activity.active.load(Ordering::Acquire) {
        thread::sleep(poll_interval);
    }
    tracing::debug!(session = session_id, "callback supervisor exiting");
    match activity.fault.error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Adapts engine buffers of any size to fixed `frames_per_buffer` producer calls.
struct Renderer<P> {
    producer: P,
    staging: Vec<f32>,
    pos: usize,
    finishing: bool,
    activity: Arc<Activity>,
}

impl<P: Producer> Renderer<P> {
    fn new(producer: P, frames_per_buffer: usize, activity: Arc<Activity>) -> Self {
        Self {
            producer,
            staging: vec![0.0; frames_per_buffer],
            pos: frames_per_buffer,
            finishing: false,
            activity,
        }
    }

    fn render(&mut self, out: &mut [f32]) {
        let mut written = 0;
        while written < out.len() {
            if self.pos >= self.staging.len() {
                if self.finishing || self.activity.halted.load(Ordering::Acquire) {
                    out[written..].fill(0.0);
                    self.activity.active.store(false, Ordering::Release);
                    return;
                }
                if self.producer.produce(&mut self.staging) == StreamFlow::Complete {
                    self.finishing = true;
                }
                self.pos = 0;
            }

            let n = (self.staging.len() - self.pos).min(out.len() - written);
            out[written..written + n].copy_from_slice(&self.staging[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
    }
}
