use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use signal_player::PlayerConfig;

#[derive(Parser, Debug)]
#[command(name = "signal-demo", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Run against a software clock instead of the audio device
    #[arg(long)]
    pub headless: bool,

    /// How often the callback supervisor checks for stream completion (ms)
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Buffer-player queue size in seconds of audio
    #[arg(long, default_value_t = 0.5)]
    pub queue_seconds: f32,
}

impl Args {
    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            queue_seconds: self.queue_seconds,
            ..PlayerConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a sine oscillator; type `freq <hz>`, `gain <dbfs>` or `stop` on stdin
    Sine {
        /// Oscillator frequency in Hz
        #[arg(long, default_value_t = 2000.0)]
        frequency: f32,

        /// Output gain in dBFS
        #[arg(long, default_value_t = -6.0, allow_negative_numbers = true)]
        gain_db: f32,

        #[arg(long, default_value_t = 48_000)]
        sample_rate: u32,

        #[arg(long, default_value_t = 128)]
        frames_per_buffer: u32,

        /// Stop after this many seconds instead of waiting for `stop` or Ctrl-C
        #[arg(long)]
        seconds: Option<f32>,
    },

    /// Apply gain to a 16-bit mono WAV, play the result and write it out
    Process {
        /// Signed 16-bit PCM mono .wav
        input: PathBuf,

        output: PathBuf,

        /// Gain applied before playback, in dB
        #[arg(long, default_value_t = 24.0, allow_negative_numbers = true)]
        gain_db: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_defaults() {
        let args = Args::try_parse_from(["signal-demo", "sine"]).unwrap();
        let Command::Sine {
            frequency,
            gain_db,
            sample_rate,
            frames_per_buffer,
            seconds,
        } = args.cmd
        else {
            panic!("expected sine");
        };
        assert_eq!(frequency, 2000.0);
        assert_eq!(gain_db, -6.0);
        assert_eq!(sample_rate, 48_000);
        assert_eq!(frames_per_buffer, 128);
        assert!(seconds.is_none());
        assert!(!args.headless);
    }

    #[test]
    fn process_accepts_negative_gain_and_global_flags() {
        let args = Args::try_parse_from([
            "signal-demo",
            "--headless",
            "--poll-interval-ms",
            "20",
            "process",
            "in.wav",
            "out.wav",
            "--gain-db",
            "-3",
        ])
        .unwrap();
        assert!(args.headless);
        assert_eq!(args.player_config().poll_interval, Duration::from_millis(20));
        match args.cmd {
            Command::Process {
                input,
                output,
                gain_db,
            } => {
                assert_eq!(input, PathBuf::from("in.wav"));
                assert_eq!(output, PathBuf::from("out.wav"));
                assert_eq!(gain_db, -3.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_poll_interval_is_raised_to_one_ms() {
        let args = Args::try_parse_from(["signal-demo", "--poll-interval-ms", "0", "sine"]).unwrap();
        assert_eq!(args.player_config().poll_interval, Duration::from_millis(1));
    }
}
