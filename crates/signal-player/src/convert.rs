//! Sample conversion between integer PCM and normalized `f32` signals.
//!
//! Signals are normalized to `[-1.0, 1.0)`. Integer PCM is scaled by
//! `2^(bits-1)`, so `i16::MIN` maps to exactly `-1.0` while `i16::MAX` lands
//! one quantization step below `1.0`.
//!
//! Converting a signal back to PCM hard-limits to the `i16` range: boosted
//! samples saturate instead of wrapping around.

use crate::error::{PlayerError, Result};

/// Full-scale divisor for 16-bit PCM.
pub const PCM16_SCALE: f32 = 32_768.0;
const PCM32_SCALE: f64 = 2_147_483_648.0;

/// Decoded samples whose representation is only known at runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleBuffer {
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleBuffer {
    /// Short name of the element type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SampleBuffer::I16(_) => "i16",
            SampleBuffer::I32(_) => "i32",
            SampleBuffer::F32(_) => "f32",
            SampleBuffer::F64(_) => "f64",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::I16(v) => v.len(),
            SampleBuffer::I32(v) => v.len(),
            SampleBuffer::F32(v) => v.len(),
            SampleBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<i16>> for SampleBuffer {
    fn from(v: Vec<i16>) -> Self {
        SampleBuffer::I16(v)
    }
}

impl From<Vec<i32>> for SampleBuffer {
    fn from(v: Vec<i32>) -> Self {
        SampleBuffer::I32(v)
    }
}

impl From<Vec<f32>> for SampleBuffer {
    fn from(v: Vec<f32>) -> Self {
        SampleBuffer::F32(v)
    }
}

impl From<Vec<f64>> for SampleBuffer {
    fn from(v: Vec<f64>) -> Self {
        SampleBuffer::F64(v)
    }
}

/// Convert integer PCM to a normalized `f32` signal.
///
/// Fails with [`PlayerError::TypeKind`] for floating-point input.
pub fn pcm_to_signal(data: &SampleBuffer) -> Result<Vec<f32>> {
    match data {
        SampleBuffer::I16(pcm) => Ok(pcm16_to_signal(pcm)),
        SampleBuffer::I32(pcm) => Ok(pcm
            .iter()
            .map(|&s| (f64::from(s) / PCM32_SCALE) as f32)
            .collect()),
        other => Err(PlayerError::TypeKind {
            expected: "signed integer",
            actual: other.kind(),
        }),
    }
}

/// Convert a floating-point signal to 16-bit PCM, clipping out-of-range values.
///
/// Fails with [`PlayerError::TypeKind`] for integer input.
pub fn signal_to_pcm(data: &SampleBuffer) -> Result<Vec<i16>> {
    match data {
        SampleBuffer::F32(signal) => Ok(signal_to_pcm16(signal)),
        SampleBuffer::F64(signal) => Ok(signal
            .iter()
            .map(|&s| (s * f64::from(PCM16_SCALE)).clamp(i16::MIN.into(), i16::MAX.into()) as i16)
            .collect()),
        other => Err(PlayerError::TypeKind {
            expected: "floating point",
            actual: other.kind(),
        }),
    }
}

/// Typed fast path of [`pcm_to_signal`] for 16-bit PCM.
pub fn pcm16_to_signal(pcm: &[i16]) -> Vec<f32> {
    pcm.iter().map(|&s| f32::from(s) / PCM16_SCALE).collect()
}

/// Typed fast path of [`signal_to_pcm`]; truncates toward zero after clipping.
///
/// NaN samples become `0`.
pub fn signal_to_pcm16(signal: &[f32]) -> Vec<i16> {
    signal.iter().map(|&s| sample_to_pcm16(s)).collect()
}

#[inline]
fn sample_to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_SCALE).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Linear amplitude to decibels relative to full scale.
///
/// `0.0` yields negative infinity.
pub fn linear_to_dbfs(linear: f32) -> f32 {
    20.0 * linear.abs().log10()
}

/// Decibels relative to full scale to linear amplitude.
pub fn dbfs_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Scale `signal` in place by a gain expressed in dB. No clipping is applied.
pub fn apply_gain_db(signal: &mut [f32], db: f32) {
    let gain = dbfs_to_linear(db);
    for sample in signal.iter_mut() {
        *sample *= gain;
    }
}
