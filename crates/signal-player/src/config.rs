use std::time::Duration;

/// Playback tuning parameters shared by both players.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// How often the callback supervisor checks whether the stream is still active.
    pub poll_interval: Duration,
    /// Capacity of the synchronous-write queue, in seconds of audio.
    pub queue_seconds: f32,
    /// Device buffer size requested for synchronous-write streams.
    pub write_frames_per_buffer: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            queue_seconds: 0.5,
            write_frames_per_buffer: 1024,
        }
    }
}
