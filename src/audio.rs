//! cpal input backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, InputCallbackInfo, Sample, SampleFormat, SampleRate, SizedSample, Stream,
    StreamConfig, StreamError, SupportedStreamConfigRange,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::capture::{CaptureBackend, READ_TIMEOUT, SampleSource};
use crate::error::{CaptureError, Error, Result};

/// Captures from a cpal input device, the host default unless named.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    device: Option<String>,
}

impl CpalBackend {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();
        match &self.device {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| Error::DeviceUnavailable(format!("no input device named {name:?}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| Error::DeviceUnavailable("no default input device".into())),
        }
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn SampleSource>> {
        let device = self.find_device()?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());

        let range = pick_input_config(&device, sample_rate)?;
        let sample_format = range.sample_format();
        let cfg: StreamConfig = range.with_sample_rate(SampleRate(sample_rate)).config();
        let channels = cfg.channels as usize;

        log::info!(
            "opening input {device_name:?}: {} Hz, {channels} ch, {sample_format:?}",
            sample_rate
        );

        let (tx_frames, rx_frames) = crossbeam_channel::bounded::<Vec<f32>>(32);
        let (tx_errors, rx_errors) = crossbeam_channel::bounded::<StreamError>(8);

        let stream = create_input_stream(&device, sample_format, &cfg, channels, tx_frames, tx_errors)?;

        Ok(Box::new(CpalSource {
            _stream: stream,
            frames: rx_frames,
            errors: rx_errors,
        }))
    }

    fn name(&self) -> String {
        match &self.device {
            Some(name) => name.clone(),
            None => cpal::default_host()
                .default_input_device()
                .and_then(|d| d.name().ok())
                .unwrap_or_else(|| "default input".to_string()),
        }
    }
}

/// Names of all input devices on the default host.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    Ok(host
        .input_devices()?
        .filter_map(|d| d.name().ok())
        .collect())
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::I16
            | SampleFormat::F32
            | SampleFormat::I32
            | SampleFormat::U16
            | SampleFormat::I8
            | SampleFormat::U8
    )
}

/// Prefer mono, then 16-bit integer, among configs that cover `sample_rate`.
fn pick_input_config(device: &Device, sample_rate: u32) -> Result<SupportedStreamConfigRange> {
    let target = SampleRate(sample_rate);
    let mut ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()?
        .filter(|r| r.min_sample_rate() <= target && target <= r.max_sample_rate())
        .filter(|r| is_supported_format(r.sample_format()))
        .collect();

    ranges.sort_by_key(|r| (r.channels() != 1, r.sample_format() != SampleFormat::I16));

    ranges.into_iter().next().ok_or_else(|| {
        Error::DeviceUnavailable(format!("no supported input format at {sample_rate} Hz"))
    })
}

struct CpalSource {
    // Dropping the stream stops the callback and releases the device.
    _stream: Stream,
    frames: Receiver<Vec<f32>>,
    errors: Receiver<StreamError>,
}

impl SampleSource for CpalSource {
    fn read(&mut self, out: &mut Vec<f32>) -> std::result::Result<usize, CaptureError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(match err {
                StreamError::DeviceNotAvailable => CaptureError::Disconnected,
                other => CaptureError::Stream(other.to_string()),
            });
        }

        match self.frames.recv_timeout(READ_TIMEOUT) {
            Ok(chunk) => {
                out.extend_from_slice(&chunk);
                Ok(chunk.len())
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Disconnected),
        }
    }
}

fn build_input_stream<T>(
    device: &Device,
    cfg: &StreamConfig,
    channels: usize,
    tx_frames: Sender<Vec<f32>>,
    tx_errors: Sender<StreamError>,
) -> Result<Stream>
where
    T: Sample + Send + 'static + SizedSample + std::fmt::Debug,
    f32: FromSample<<T as Sample>::Float>,
{
    let err_callback = move |err: StreamError| {
        let _ = tx_errors.try_send(err);
    };

    let scale = 1.0 / channels.max(1) as f32;
    let input_callback = move |data: &[T], _info: &InputCallbackInfo| {
        // Downmix interleaved frames to mono f32
        let mono_chunk: Vec<f32> = data
            .chunks(channels.max(1))
            .map(|frame| {
                frame
                    .iter()
                    .map(|s| f32::from_sample(s.to_float_sample()))
                    .sum::<f32>()
                    * scale
            })
            .collect();

        if !mono_chunk.is_empty() {
            // A full channel means the capture thread is behind; drop the block.
            let _ = tx_frames.try_send(mono_chunk);
        }
    };

    let latency = Some(Duration::from_millis(20));
    let stream = device.build_input_stream(cfg, input_callback, err_callback, latency)?;
    stream.play()?;
    Ok(stream)
}

fn create_input_stream(
    device: &Device,
    sample_format: SampleFormat,
    cfg: &StreamConfig,
    channels: usize,
    tx_frames: Sender<Vec<f32>>,
    tx_errors: Sender<StreamError>,
) -> Result<Stream> {
    match sample_format {
        SampleFormat::I16 => build_input_stream::<i16>(device, cfg, channels, tx_frames, tx_errors),
        SampleFormat::F32 => build_input_stream::<f32>(device, cfg, channels, tx_frames, tx_errors),
        SampleFormat::I32 => build_input_stream::<i32>(device, cfg, channels, tx_frames, tx_errors),
        SampleFormat::U16 => build_input_stream::<u16>(device, cfg, channels, tx_frames, tx_errors),
        SampleFormat::I8 => build_input_stream::<i8>(device, cfg, channels, tx_frames, tx_errors),
        SampleFormat::U8 => build_input_stream::<u8>(device, cfg, channels, tx_frames, tx_errors),
        other => Err(Error::DeviceUnavailable(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats() {
        assert!(is_supported_format(SampleFormat::I16));
        assert!(is_supported_format(SampleFormat::F32));
        assert!(!is_supported_format(SampleFormat::F64));
    }

    #[test]
    fn test_integer_samples_convert_to_unit_range() {
        assert_eq!(f32::from_sample(i16::MIN.to_float_sample()), -1.0);
        assert!((f32::from_sample(i16::MAX.to_float_sample()) - 1.0).abs() < 1e-4);
        assert!(f32::from_sample(u16::MAX.to_float_sample()) > 0.99);
    }

    #[test]
    fn test_named_backend_reports_its_name() {
        let backend = CpalBackend::new(Some("Studio Mic".into()));
        assert_eq!(backend.name(), "Studio Mic");
    }
}
