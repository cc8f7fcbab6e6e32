//! CPAL output backend.
//!
//! Opens streams on the host's default output device. The device's sample format is
//! picked from its supported configs for the requested channel count and rate; the
//! render closure always produces `f32`, converted in the callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{AudioBackend, ErrorFn, OutputStream, RenderFn, StreamParams};
use crate::error::{PlayerError, Result};

/// Default output device of the default CPAL host.
pub struct CpalBackend {
    device: cpal::Device,
    name: String,
}

impl CpalBackend {
    /// Acquire the default host and its default output device.
    ///
    /// Fails with [`PlayerError::DeviceInit`] when the host reports no output device.
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            PlayerError::DeviceInit(format!("no default output device on {}", host.id().name()))
        })?;
        let name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown device".to_string());
        tracing::info!(host = host.id().name(), device = %name, "output device");
        Ok(Self { device, name })
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_stream(
        &self,
        params: &StreamParams,
        render: RenderFn,
        on_error: ErrorFn,
    ) -> Result<Box<dyn OutputStream>> {
        params.validate()?;
        let supported = pick_output_config(&self.device, params.channels, params.sample_rate)?;
        let config = cpal::StreamConfig {
            channels: params.channels,
            sample_rate: params.sample_rate,
            buffer_size: pick_buffer_size(supported.buffer_size(), params.frames_per_buffer),
        };
        tracing::debug!(
            device = %self.name,
            channels = config.channels,
            rate_hz = config.sample_rate,
            buffer_size = ?config.buffer_size,
            sample_format = ?supported.sample_format(),
            mode = ?params.mode,
            "opening output stream"
        );

        let stream = build_output_stream(
            &self.device,
            &config,
            supported.sample_format(),
            params.buffer_samples(),
            render,
            on_error,
        )?;
        Ok(Box::new(CpalStream { stream }))
    }
}

struct CpalStream {
    stream: cpal::Stream,
}

impl OutputStream for CpalStream {
    fn start(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| PlayerError::StreamControl(format!("start: {e}")))
    }

    fn stop(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| PlayerError::StreamControl(format!("pause: {e}")))
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        tracing::debug!("output stream closed");
    }
}

/// Pick the supported config for an exact `(channels, rate)` shape.
///
/// Among matching ranges, prefers `f32`, then `i32`, `i16`, `u16`. No resampling or
/// channel mapping is attempted, so an unmatched shape is a [`PlayerError::StreamOpen`].
fn pick_output_config(
    device: &cpal::Device,
    channels: u16,
    rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| PlayerError::StreamOpen(format!("query output configs: {e}")))?;

    let mut best: Option<(u8, cpal::SupportedStreamConfigRange)> = None;
    for range in ranges {
        if range.channels() != channels
            || rate < range.min_sample_rate()
            || rate > range.max_sample_rate()
        {
            continue;
        }
        let rank = sample_format_rank(range.sample_format());
        if rank == UNSUPPORTED_RANK {
            continue;
        }
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => rank < *best_rank,
        };
        if replace {
            best = Some((rank, range));
        }
    }

    best.map(|(_, range)| range.with_sample_rate(rate))
        .ok_or_else(|| {
            PlayerError::StreamOpen(format!(
                "device has no output config for {channels} channel(s) at {rate} Hz"
            ))
        })
}

const UNSUPPORTED_RANK: u8 = 10;

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => UNSUPPORTED_RANK,
    }
}

/// Request `wanted` frames per callback, clamped to what the device advertises.
///
/// Returns the device default when the range is unknown.
fn pick_buffer_size(supported: &cpal::SupportedBufferSize, wanted: u32) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } if min <= max => {
            cpal::BufferSize::Fixed(wanted.clamp(*min, *max))
        }
        _ => cpal::BufferSize::Default,
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    initial_samples: usize,
    render: RenderFn,
    on_error: ErrorFn,
) -> Result<cpal::Stream> {
    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, config, initial_samples, render, on_error)
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(device, config, initial_samples, render, on_error)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, config, initial_samples, render, on_error)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, config, initial_samples, render, on_error)
        }
        other => {
            return Err(PlayerError::StreamOpen(format!(
                "unsupported sample format: {other:?}"
            )));
        }
    };
    stream.map_err(|e| PlayerError::StreamOpen(e.to_string()))
}

/// Type-specialized stream builder for CPAL sample formats.
///
/// The callback renders into an `f32` scratch buffer that only grows when the device
/// hands over a larger buffer than any before, then converts into the device format.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    initial_samples: usize,
    mut render: RenderFn,
    mut on_error: ErrorFn,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch = vec![0.0f32; initial_samples];

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let buf = &mut scratch[..data.len()];
            render(buf);
            for (dst, &src) in data.iter_mut().zip(buf.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(src);
            }
        },
        move |err| {
            tracing::warn!("stream error: {err}");
            on_error(err.to_string());
        },
        None,
    )
}
