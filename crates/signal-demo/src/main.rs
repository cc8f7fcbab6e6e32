//! signal-demo: drives the `signal-player` crate from the command line.
//!
//! ## Modes
//! - `sine`: a live oscillator on the callback player, controlled from stdin.
//! - `process`: read a 16-bit mono WAV, boost it, play it on the buffer player and
//!   write the clipped result to a new WAV.
//!
//! `--headless` swaps the audio device for a software clock, for machines without
//! an output device.

mod cli;
mod control;
mod wav;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use signal_player::convert::{SampleBuffer, apply_gain_db, pcm_to_signal, signal_to_pcm};
use signal_player::{
    BufferPlayer, CallbackPlayer, DeviceSession, HeadlessBackend, Oscillator, OscillatorControls,
    PlayerConfig, StreamFlow,
};
use tracing_subscriber::EnvFilter;

use crate::control::ControlCommand;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,signal_player=info")
        }))
        .init();

    let config = args.player_config();
    match &args.cmd {
        cli::Command::Sine {
            frequency,
            gain_db,
            sample_rate,
            frames_per_buffer,
            seconds,
        } => run_sine(
            open_session(args.headless)?,
            config,
            SineOptions {
                frequency: *frequency,
                gain_db: *gain_db,
                sample_rate: *sample_rate,
                frames_per_buffer: *frames_per_buffer,
                seconds: *seconds,
            },
        ),
        cli::Command::Process {
            input,
            output,
            gain_db,
        } => run_process(args.headless, config, input, output, *gain_db),
    }
}

fn open_session(headless: bool) -> Result<DeviceSession> {
    if headless {
        return Ok(DeviceSession::with_backend(HeadlessBackend::new()));
    }
    DeviceSession::open_default().context("open audio device (try --headless)")
}

struct SineOptions {
    frequency: f32,
    gain_db: f32,
    sample_rate: u32,
    frames_per_buffer: u32,
    seconds: Option<f32>,
}

fn run_sine(session: DeviceSession, config: PlayerConfig, opts: SineOptions) -> Result<()> {
    let mut oscillator = Oscillator::new(
        opts.sample_rate,
        Arc::new(OscillatorControls::new(2_000.0, 0.5)),
    );
    let controls = oscillator.controls().clone();
    control::apply(&controls, ControlCommand::Frequency(opts.frequency));
    control::apply(&controls, ControlCommand::Gain(opts.gain_db));

    let producer = move |out: &mut [f32]| {
        oscillator.fill(out);
        StreamFlow::Continue
    };
    let mut player = CallbackPlayer::with_config(
        session,
        producer,
        opts.sample_rate,
        opts.frames_per_buffer,
        config,
    )?;

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let ctrlc_tx = cmd_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(ControlCommand::Stop);
    }) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }
    control::spawn_stdin_reader(cmd_tx).context("spawn stdin reader")?;

    let supervisor = player.play()?;
    tracing::info!(
        frequency_hz = controls.frequency(),
        gain_db = controls.gain_db(),
        rate_hz = player.sample_rate(),
        frames_per_buffer = player.frames_per_buffer(),
        backend = player.session().backend_name(),
        "oscillator playing; commands: freq <hz>, gain <dbfs>, stop"
    );

    let deadline = opts
        .seconds
        .and_then(|s| Duration::try_from_secs_f32(s).ok())
        .and_then(|d| Instant::now().checked_add(d));
    loop {
        let timeout = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::from_millis(250),
        };
        match cmd_rx.recv_timeout(timeout) {
            Ok(cmd) => {
                if !control::apply(&controls, cmd) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|d| Instant::now() >= d) || !player.is_active() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    player.stop()?;
    supervisor.join()?;
    tracing::info!("oscillator stopped");
    Ok(())
}

fn run_process(
    headless: bool,
    config: PlayerConfig,
    input: &std::path::Path,
    output: &std::path::Path,
    gain_db: f32,
) -> Result<()> {
    // Validate the input before touching the audio device.
    let clip = wav::read_pcm16_mono(input)?;
    tracing::info!(
        path = %input.display(),
        frames = clip.samples.len(),
        rate_hz = clip.sample_rate,
        "input loaded"
    );

    let mut signal = pcm_to_signal(&SampleBuffer::I16(clip.samples))?;
    apply_gain_db(&mut signal, gain_db);

    let player = BufferPlayer::with_config(open_session(headless)?, config);
    let playback = player.play(&signal, clip.channels, clip.sample_rate);
    tracing::info!(backend = player.session().backend_name(), "playback started");

    let written = write_output(output, signal, clip.channels, clip.sample_rate);
    // Let playback finish even when the output could not be written.
    let played = playback.join();
    written?;
    tracing::info!(path = %output.display(), gain_db, "output written");
    played?;
    Ok(())
}

fn write_output(path: &std::path::Path, signal: Vec<f32>, channels: u16, rate: u32) -> Result<()> {
    let pcm = signal_to_pcm(&SampleBuffer::F32(signal))?;
    wav::write_pcm16(path, &pcm, channels, rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_waits_for_playback_when_output_write_fails() {
        let input = std::env::temp_dir().join(format!("signal-demo-{}-process-in.wav", std::process::id()));
        wav::write_pcm16(&input, &vec![1_000i16; 4_000], 1, 8_000).unwrap();

        let started = Instant::now();
        let result = run_process(
            true,
            PlayerConfig::default(),
            &input,
            std::path::Path::new("/nonexistent/dir/out.wav"),
            0.0,
        );
        let elapsed = started.elapsed();
        let _ = std::fs::remove_file(&input);

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/dir/out.wav"));
        // 4000 frames at 8 kHz.
        assert!(elapsed >= Duration::from_millis(450), "returned after {elapsed:?}");
    }
}
