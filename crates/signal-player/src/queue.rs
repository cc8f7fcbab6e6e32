//! Bounded queue carrying interleaved samples from a blocking writer to an output callback.
//!
//! Synchronous-write streams use [`SharedAudio`] as their device buffer:
//! - the writer thread pushes with [`SharedAudio::push_interleaved_blocking`]
//! - the output callback drains with [`SharedAudio::pop_into`] (never blocks on the condvar)
//! - the writer closes the queue and waits for the callback to drain it
//!
//! Shutdown is deterministic: [`SharedAudio::close`] lets buffered audio play out,
//! [`SharedAudio::abort`] discards it and wakes every waiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Thread-safe bounded queue for interleaved `f32` audio samples.
///
/// ## Design
/// - Bounded by `max_buffered_samples` to cap memory and latency.
/// - A single [`Condvar`] signals any state change.
/// - The `done` flag lives under the same mutex as the samples to avoid races.
///
/// The `channels` count is fixed for the lifetime of the queue.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Compute a queue capacity in **samples** for a `(rate, channels, seconds)` target.
///
/// - Non-finite or non-positive `buffer_seconds` falls back to half a second.
/// - The result is at least one frame.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.5
    };

    let frames = ((rate_hz as f32 * secs).ceil() as usize).max(1);
    frames.saturating_mul(channels.max(1))
}

impl SharedAudio {
    /// Create a new bounded queue. `max_buffered_samples` is a cap in samples, not frames.
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::with_capacity(max_buffered_samples),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
        }
    }

    /// Mark the queue as finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.lock();
        g.done = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Close the queue and drop anything still buffered.
    pub fn abort(&self) {
        let mut g = self.lock();
        g.done = true;
        g.queue.clear();
        drop(g);
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns the number of samples accepted; less than `samples.len()` only when
    /// the queue was closed while waiting.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) -> usize {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.lock();

            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            if g.done {
                return offset;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let end = samples.len().min(offset + room);
            g.queue.extend(&samples[offset..end]);
            offset = end;

            drop(g);
            self.cv.notify_all();
        }
        offset
    }

    /// Move up to `out.len()` samples (whole frames only) into `out` without waiting.
    ///
    /// Returns the number of samples written. Called from the output callback, so it
    /// only takes the mutex and never waits on the condvar.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut g = self.lock();
        let available_frames = g.queue.len() / self.channels;
        let take = available_frames.min(out.len() / self.channels) * self.channels;
        if take == 0 {
            return 0;
        }

        for (dst, src) in out.iter_mut().zip(g.queue.drain(..take)) {
            *dst = src;
        }

        drop(g);
        self.cv.notify_all();
        take
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Block until `q` is closed and empty OR `cancel` becomes true.
///
/// Returns `true` if the queue drained normally, `false` if cancelled.
pub fn wait_until_done_and_empty_or_cancel(q: &SharedAudio, cancel: &AtomicBool) -> bool {
    let mut g = q.lock();
    loop {
        if cancel.load(Ordering::Acquire) {
            return false;
        }

        if g.done && g.queue.is_empty() {
            return true;
        }

        let (ng, _timeout) = q
            .cv
            .wait_timeout(g, Duration::from_millis(50))
            .unwrap_or_else(|e| e.into_inner());
        g = ng;
    }
}
