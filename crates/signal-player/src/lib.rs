//! Playback of mono `f32` signals through the host audio device.
//!
//! - [`BufferPlayer`] plays a pre-computed buffer to completion on a background thread.
//! - [`CallbackPlayer`] streams audio pulled from a [`Producer`] by the audio engine.
//! - [`convert`] bridges 16-bit PCM storage and normalized float signals.
//!
//! Both players own a [`DeviceSession`], which releases the engine after every stream
//! opened through it has been closed.

pub mod backend;
pub mod buffer_player;
pub mod callback_player;
pub mod config;
pub mod convert;
pub mod error;
pub mod handle;
pub mod oscillator;
pub mod queue;
pub mod session;

pub use backend::{AudioBackend, CpalBackend, HeadlessBackend};
pub use buffer_player::BufferPlayer;
pub use callback_player::{CallbackPlayer, PlayerState, Producer, StreamFlow};
pub use config::PlayerConfig;
pub use error::{ErrorHook, PlayerError, Result};
pub use handle::PlaybackHandle;
pub use oscillator::{Oscillator, OscillatorControls};
pub use session::DeviceSession;
