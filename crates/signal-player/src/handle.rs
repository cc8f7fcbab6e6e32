//! Join handles for background playback threads.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{ErrorHook, PlayerError, Result, report};

/// Handle to a background playback thread (a buffer write or a callback supervisor).
///
/// Dropping the handle detaches the thread. Errors are logged and sent to the player's
/// error hook either way; `join` additionally returns them.
#[derive(Debug)]
pub struct PlaybackHandle {
    state: HandleState,
}

#[derive(Debug)]
enum HandleState {
    /// `done` disconnects when the thread's closure returns or unwinds.
    Running {
        join: JoinHandle<Result<()>>,
        done: Receiver<()>,
    },
    Finished(Result<()>),
}

impl PlaybackHandle {
    /// A handle whose outcome is already known (fail-fast paths).
    pub(crate) fn finished(result: Result<()>) -> Self {
        Self {
            state: HandleState::Finished(result),
        }
    }

    /// Whether the thread has exited.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Running { join, .. } => join.is_finished(),
            HandleState::Finished(_) => true,
        }
    }

    /// Block until the task has returned or `timeout` passes. Returns `true` if it returned.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match &self.state {
            HandleState::Running { done, .. } => {
                !matches!(done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
            }
            HandleState::Finished(_) => true,
        }
    }

    /// Block until the thread exits and return its outcome.
    pub fn join(self) -> Result<()> {
        match self.state {
            HandleState::Running { join, .. } => join
                .join()
                .unwrap_or_else(|_| Err(PlayerError::Thread("playback thread panicked".into()))),
            HandleState::Finished(result) => result,
        }
    }
}

/// Spawn a named playback thread whose failure is reported through `hook`.
///
/// If the thread cannot be spawned the failure is reported the same way and the
/// returned handle is already finished.
pub(crate) fn spawn_task<F>(name: &str, task: &'static str, hook: Option<ErrorHook>, f: F) -> PlaybackHandle
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let hook_for_thread = hook.clone();
    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
    let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
        let _done = done_tx;
        let result = f();
        if let Err(e) = &result {
            report(hook_for_thread.as_ref(), task, e);
        }
        result
    });

    match spawned {
        Ok(join) => PlaybackHandle {
            state: HandleState::Running {
                join,
                done: done_rx,
            },
        },
        Err(e) => {
            let err = PlayerError::Thread(format!("spawn {name}: {e}"));
            report(hook.as_ref(), task, &err);
            PlaybackHandle::finished(Err(err))
        }
    }
}
