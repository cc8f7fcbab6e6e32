//! Play a pre-computed signal buffer to completion on a background thread.
//!
//! Each [`BufferPlayer::play`] call runs open → write → stop → close on its own thread:
//! - the stream is opened in synchronous-write mode
//! - the whole buffer is written in one call that blocks until the engine consumed it
//! - the stream is stopped and dropped, then the thread exits
//!
//! Calls are independent. Two overlapping calls open two streams; callers who want one
//! stream at a time serialize through the returned [`PlaybackHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{OutputStream, StreamMode, StreamParams};
use crate::config::PlayerConfig;
use crate::error::{ErrorHook, FaultSlot, PlayerError, Result, report};
use crate::handle::{PlaybackHandle, spawn_task};
use crate::queue::{SharedAudio, calc_max_buffered_samples, wait_until_done_and_empty_or_cancel};
use crate::session::DeviceSession;

/// Plays whole `f32` buffers, one background thread per call.
pub struct BufferPlayer {
    session: Arc<DeviceSession>,
    config: PlayerConfig,
    error_hook: Option<ErrorHook>,
}

impl BufferPlayer {
    pub fn new(session: DeviceSession) -> Self {
        Self::with_config(session, PlayerConfig::default())
    }

    pub fn with_config(session: DeviceSession, config: PlayerConfig) -> Self {
        Self {
            session: Arc::new(session),
            config,
            error_hook: None,
        }
    }

    /// Player on the default output device.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(DeviceSession::open_default()?))
    }

    /// Receive errors raised by detached playback threads.
    pub fn set_error_hook(&mut self, hook: impl Fn(&PlayerError) + Send + Sync + 'static) {
        self.error_hook = Some(Arc::new(hook));
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Start playing `signal` and return immediately.
    ///
    /// `signal` is interleaved when `channels > 1`. Parameter errors are not returned
    /// here: the handle comes back already finished with the error, which is also logged
    /// and sent to the error hook. Use [`BufferPlayer::try_play`] to get them directly.
    pub fn play(&self, signal: &[f32], channels: u16, rate: u32) -> PlaybackHandle {
        match self.try_play(signal, channels, rate) {
            Ok(handle) => handle,
            Err(e) => {
                report(self.error_hook.as_ref(), "buffer playback", &e);
                PlaybackHandle::finished(Err(e))
            }
        }
    }

    /// Like [`BufferPlayer::play`], but parameter errors are returned synchronously.
    pub fn try_play(&self, signal: &[f32], channels: u16, rate: u32) -> Result<PlaybackHandle> {
        let params = StreamParams {
            channels,
            sample_rate: rate,
            frames_per_buffer: self.config.write_frames_per_buffer,
            mode: StreamMode::BlockingWrite,
        };
        params.validate()?;
        if signal.len() % usize::from(channels) != 0 {
            return Err(PlayerError::InvalidParams(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                signal.len()
            )));
        }

        let session = self.session.clone();
        let queue_seconds = self.config.queue_seconds;
        let samples: Arc<[f32]> = Arc::from(signal);

        Ok(spawn_task(
            "buffer-player",
            "buffer playback",
            self.error_hook.clone(),
            move || play_blocking(&session, &params, queue_seconds, &samples),
        ))
    }
}

/// Open, write, stop and close one stream on the calling thread.
fn play_blocking(
    session: &DeviceSession,
    params: &StreamParams,
    queue_seconds: f32,
    samples: &[f32],
) -> Result<()> {
    let started = Instant::now();
    let writer = BlockingWriter::open(session, params, queue_seconds)?;
    writer.write(samples)?;
    writer.close()?;
    tracing::info!(
        session = session.id(),
        frames = samples.len() / usize::from(params.channels),
        channels = params.channels,
        rate_hz = params.sample_rate,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "buffer playback finished"
    );
    Ok(())
}

/// Extra wait after the engine's last pull, on top of one engine buffer.
const TAIL_MARGIN: Duration = Duration::from_millis(100);

/// Synchronous-write stream: a bounded queue drained by the engine's render callback.
struct BlockingWriter {
    queue: Arc<SharedAudio>,
    fault: Arc<FaultSlot>,
    stream: Box<dyn OutputStream>,
    /// Largest buffer the engine has pulled, in frames. May exceed the requested size.
    engine_frames: Arc<AtomicUsize>,
    sample_rate: u32,
}

impl BlockingWriter {
    fn open(session: &DeviceSession, params: &StreamParams, queue_seconds: f32) -> Result<Self> {
        let channels = usize::from(params.channels);
        let queue = Arc::new(SharedAudio::new(
            channels,
            calc_max_buffered_samples(params.sample_rate, channels, queue_seconds),
        ));
        let fault = Arc::new(FaultSlot::default());

        let engine_frames = Arc::new(AtomicUsize::new(0));

        let render_queue = queue.clone();
        let render_frames = engine_frames.clone();
        let render = Box::new(move |out: &mut [f32]| {
            render_frames.fetch_max(out.len() / channels, Ordering::Relaxed);
            let n = render_queue.pop_into(out);
            out[n..].fill(0.0);
        });

        let error_queue = queue.clone();
        let error_fault = fault.clone();
        let on_error = Box::new(move |message: String| {
            if error_fault.raise(message) {
                error_queue.abort();
            }
        });

        let stream = session.open_stream(params, render, on_error)?;
        Ok(Self {
            queue,
            fault,
            stream,
            engine_frames,
            sample_rate: params.sample_rate,
        })
    }

    /// Block until every sample has been pulled by the engine, or the engine faults.
    fn write(&self, samples: &[f32]) -> Result<()> {
        self.stream.start()?;
        let accepted = self.queue.push_interleaved_blocking(samples);
        self.queue.close();
        let drained = wait_until_done_and_empty_or_cancel(&self.queue, self.fault.flag());

        if let Some(err) = self.fault.error() {
            return Err(err);
        }
        if !drained || accepted < samples.len() {
            return Err(PlayerError::CallbackFault(format!(
                "write interrupted after {accepted} of {} samples",
                samples.len()
            )));
        }

        // The last pull is still in the device buffer.
        thread::sleep(self.tail());
        Ok(())
    }

    fn tail(&self) -> Duration {
        let frames = self.engine_frames.load(Ordering::Relaxed);
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate)) + TAIL_MARGIN
    }

    /// Stop the stream, then drop it.
    fn close(self) -> Result<()> {
        let stopped = self.stream.stop();
        drop(self.stream);
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use std::sync::Mutex;

    fn test_config() -> PlayerConfig {
        PlayerConfig {
            write_frames_per_buffer: 64,
            ..PlayerConfig::default()
        }
    }

    fn headless_player() -> (BufferPlayer, HeadlessBackend) {
        let backend = HeadlessBackend::new();
        let session = DeviceSession::with_backend(backend.clone());
        (BufferPlayer::with_config(session, test_config()), backend)
    }

    #[test]
    fn play_returns_before_playback_finishes() {
        let (player, backend) = headless_player();
        let signal = vec![0.0f32; 100];

        let started = Instant::now();
        let handle = player.play(&signal, 1, 8_000);
        assert!(started.elapsed() < Duration::from_millis(10));
        assert!(!handle.is_finished());

        assert_eq!(handle.join(), Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(12));
        assert_eq!(backend.open_streams(), 0);
        assert!(backend.frames_rendered() >= 100);
    }

    #[test]
    fn longer_buffer_blocks_its_thread_for_playback_duration() {
        let (player, _backend) = headless_player();
        let signal = vec![0.25f32; 4_000];

        let started = Instant::now();
        player.play(&signal, 1, 8_000).join().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(450));
    }

    #[test]
    fn overlapping_plays_complete_independently() {
        let (player, backend) = headless_player();
        let first = player.play(&[0.0; 800], 1, 8_000);
        let second = player.play(&[0.0; 400], 2, 8_000);

        assert_eq!(first.join(), Ok(()));
        assert_eq!(second.join(), Ok(()));
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn session_outlives_detached_playback() {
        let (player, backend) = headless_player();
        let handle = player.play(&[0.0; 400], 1, 8_000);
        drop(player);
        assert_eq!(handle.join(), Ok(()));
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn invalid_params_fail_fast_without_opening_a_stream() {
        let (player, backend) = headless_player();

        let err = player.try_play(&[0.0; 3], 2, 8_000).err().unwrap();
        assert!(matches!(err, PlayerError::InvalidParams(_)));

        let handle = player.play(&[0.0; 4], 1, 0);
        assert!(handle.is_finished());
        assert!(matches!(handle.join(), Err(PlayerError::InvalidParams(_))));
        assert_eq!(backend.render_count(), 0);
    }

    #[test]
    fn stream_open_failure_reaches_hook_and_handle() {
        let (mut player, backend) = headless_player();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = seen.clone();
        player.set_error_hook(move |e| seen_hook.lock().unwrap().push(e.clone()));

        backend.fail_next_open("device busy");
        let handle = player.play(&[0.0; 10], 1, 8_000);

        let expected = PlayerError::StreamOpen("device busy".into());
        assert_eq!(handle.join(), Err(expected.clone()));
        assert_eq!(*seen.lock().unwrap(), vec![expected]);
    }

    #[test]
    fn engine_fault_aborts_write() {
        let (player, backend) = headless_player();
        let handle = player.play(&vec![0.0; 80_000], 1, 8_000);

        while backend.render_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        backend.inject_fault("device lost");

        assert_eq!(
            handle.join(),
            Err(PlayerError::CallbackFault("device lost".into()))
        );
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn stream_outlives_last_pull_by_engine_buffer() {
        // Engine pulls 512 frames per callback although 64 were requested.
        let backend = HeadlessBackend::with_engine_buffer_frames(512);
        let session = DeviceSession::with_backend(backend.clone());
        let player = BufferPlayer::with_config(session, test_config());

        player.play(&vec![0.5f32; 800], 1, 8_000).join().unwrap();

        let last_pull = backend.last_audible_render().unwrap();
        let stopped = backend.last_stop().unwrap();
        let engine_buffer = Duration::from_secs_f64(512.0 / 8_000.0);
        assert!(
            stopped.duration_since(last_pull) >= engine_buffer,
            "stopped {:?} after last pull",
            stopped.duration_since(last_pull)
        );
    }

    #[test]
    fn empty_buffer_completes() {
        let (player, _backend) = headless_player();
        assert_eq!(player.play(&[], 1, 8_000).join(), Ok(()));
    }
}
