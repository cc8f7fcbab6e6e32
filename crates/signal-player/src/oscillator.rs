//! Sine oscillator whose parameters can be changed from any thread while it plays.
//!
//! The control surface (a UI, a stdin reader) writes [`OscillatorControls`]; the
//! producer running on the engine thread reads them once per buffer. Phase is owned by
//! the [`Oscillator`] itself and never shared.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::convert::{dbfs_to_linear, linear_to_dbfs};

/// Frequency and amplitude shared between a control thread and the audio thread.
///
/// Values are `f32` stored as bits in atomics, so reads never block the audio thread.
#[derive(Debug)]
pub struct OscillatorControls {
    frequency_bits: AtomicU32,
    amplitude_bits: AtomicU32,
}

impl OscillatorControls {
    pub fn new(frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            frequency_bits: AtomicU32::new(frequency_hz.to_bits()),
            amplitude_bits: AtomicU32::new(amplitude.to_bits()),
        }
    }

    pub fn frequency(&self) -> f32 {
        f32::from_bits(self.frequency_bits.load(Ordering::Relaxed))
    }

    pub fn set_frequency(&self, hz: f32) {
        self.frequency_bits.store(hz.to_bits(), Ordering::Relaxed);
    }

    /// Linear gain.
    pub fn amplitude(&self) -> f32 {
        f32::from_bits(self.amplitude_bits.load(Ordering::Relaxed))
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.amplitude_bits.store(amplitude.to_bits(), Ordering::Relaxed);
    }

    pub fn gain_db(&self) -> f32 {
        linear_to_dbfs(self.amplitude())
    }

    pub fn set_gain_db(&self, db: f32) {
        self.set_amplitude(dbfs_to_linear(db));
    }
}

/// `y(t) = A * sin(phase)`, with phase advanced by `2π f / rate` per sample.
pub struct Oscillator {
    controls: Arc<OscillatorControls>,
    sample_rate: f64,
    phase: f64,
}

impl Oscillator {
    pub fn new(sample_rate: u32, controls: Arc<OscillatorControls>) -> Self {
        Self {
            controls,
            sample_rate: f64::from(sample_rate.max(1)),
            phase: 0.0,
        }
    }

    pub fn controls(&self) -> &Arc<OscillatorControls> {
        &self.controls
    }

    /// Current phase in radians, always in `[0, 2π)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Fill `out` with the next samples. Parameters are sampled once per call.
    pub fn fill(&mut self, out: &mut [f32]) {
        let amplitude = f64::from(self.controls.amplitude());
        let delta = TAU * f64::from(self.controls.frequency()) / self.sample_rate;
        for sample in out.iter_mut() {
            *sample = (amplitude * self.phase.sin()) as f32;
            // Wrap to keep precision over long runs.
            self.phase = (self.phase + delta).rem_euclid(TAU);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_round_trip_through_atomics() {
        let controls = OscillatorControls::new(2_000.0, 0.5);
        assert_eq!(controls.frequency(), 2_000.0);
        assert_eq!(controls.amplitude(), 0.5);

        controls.set_frequency(440.0);
        controls.set_gain_db(0.0);
        assert_eq!(controls.frequency(), 440.0);
        assert_eq!(controls.amplitude(), 1.0);
        assert_eq!(controls.gain_db(), 0.0);
    }

    #[test]
    fn quarter_rate_sine_hits_peaks() {
        let controls = Arc::new(OscillatorControls::new(2_000.0, 0.5));
        let mut osc = Oscillator::new(8_000, controls);
        let mut out = [0.0f32; 8];
        osc.fill(&mut out);

        let expected = [0.0, 0.5, 0.0, -0.5, 0.0, 0.5, 0.0, -0.5];
        for (got, want) in out.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-5, "{got} vs {want}");
        }
    }

    #[test]
    fn phase_stays_wrapped() {
        let controls = Arc::new(OscillatorControls::new(19_000.0, 1.0));
        let mut osc = Oscillator::new(48_000, controls);
        let mut out = vec![0.0f32; 10_000];
        osc.fill(&mut out);
        assert!((0.0..TAU).contains(&osc.phase()));
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn control_changes_apply_on_next_buffer() {
        let controls = Arc::new(OscillatorControls::new(2_000.0, 1.0));
        let mut osc = Oscillator::new(8_000, controls.clone());
        let mut out = [0.0f32; 4];
        osc.fill(&mut out);

        controls.set_amplitude(0.0);
        osc.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
