//! Text control surface for the sine demo.
//!
//! A stdin reader thread parses lines into [`ControlCommand`]s and sends them over a
//! channel; the main loop applies them to the oscillator's atomic controls.

use std::io::BufRead;

use crossbeam_channel::Sender;
use signal_player::OscillatorControls;

pub const MIN_GAIN_DB: f32 = -96.0;
pub const MAX_GAIN_DB: f32 = 0.0;
pub const MIN_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_FREQUENCY_HZ: f32 = 20_000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlCommand {
    Frequency(f32),
    Gain(f32),
    Stop,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ControlCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(None);
    };
    let value = parts.next();
    if parts.next().is_some() {
        return Err(format!("too many arguments: {line:?}"));
    }

    let number = |v: Option<&str>| -> Result<f32, String> {
        let v = v.ok_or_else(|| format!("{word} needs a value"))?;
        let n: f32 = v.parse().map_err(|_| format!("not a number: {v:?}"))?;
        if n.is_finite() {
            Ok(n)
        } else {
            Err(format!("not a finite number: {v:?}"))
        }
    };

    match word.to_ascii_lowercase().as_str() {
        "freq" | "frequency" | "f" => number(value).map(|n| Some(ControlCommand::Frequency(n))),
        "gain" | "g" => number(value).map(|n| Some(ControlCommand::Gain(n))),
        "stop" | "quit" | "q" => Ok(Some(ControlCommand::Stop)),
        other => Err(format!("unknown command {other:?} (freq <hz>, gain <dbfs>, stop)")),
    }
}

/// Apply a parameter change, clamped to the slider ranges. Returns `false` for `Stop`.
pub fn apply(controls: &OscillatorControls, cmd: ControlCommand) -> bool {
    match cmd {
        ControlCommand::Frequency(hz) => {
            let hz = hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
            controls.set_frequency(hz);
            tracing::info!(frequency_hz = hz, "frequency changed");
            true
        }
        ControlCommand::Gain(db) => {
            let db = db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
            controls.set_gain_db(db);
            tracing::info!(gain_db = db, amplitude = controls.amplitude(), "gain changed");
            true
        }
        ControlCommand::Stop => false,
    }
}

/// Read commands from stdin until EOF or the receiver goes away.
pub fn spawn_stdin_reader(tx: Sender<ControlCommand>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("stdin-control".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(cmd)) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("{e}"),
                }
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(parse_command("freq 440"), Ok(Some(ControlCommand::Frequency(440.0))));
        assert_eq!(parse_command("  G -12.5 "), Ok(Some(ControlCommand::Gain(-12.5))));
        assert_eq!(parse_command("quit"), Ok(Some(ControlCommand::Stop)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_command("freq").is_err());
        assert!(parse_command("freq abc").is_err());
        assert!(parse_command("freq inf").is_err());
        assert!(parse_command("gain 1 2").is_err());
        assert!(parse_command("louder").is_err());
    }

    #[test]
    fn apply_clamps_to_control_ranges() {
        let controls = OscillatorControls::new(1_000.0, 0.5);
        assert!(apply(&controls, ControlCommand::Frequency(50_000.0)));
        assert_eq!(controls.frequency(), MAX_FREQUENCY_HZ);

        assert!(apply(&controls, ControlCommand::Gain(12.0)));
        assert_eq!(controls.amplitude(), 1.0);

        assert!(apply(&controls, ControlCommand::Gain(-200.0)));
        assert!((controls.gain_db() - MIN_GAIN_DB).abs() < 1e-3);

        assert!(!apply(&controls, ControlCommand::Stop));
    }
}
