//! cpal-backed microphone and speaker streams.
//!
//! Streams are not `Send` on every platform, so the handles returned here are
//! kept by whoever opened them and dropped to stop the device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use panel_core::{AudioError, PlaybackBuffer, Resampler};
use tokio::sync::mpsc;
use tracing::{error, info};

use super::{downmix, MicBlock};

/// A running input stream.  Capture stops when this is dropped.
pub struct MicStream {
    _stream: Stream,
    sample_rate: u32,
}

impl MicStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// A running output stream.  Playback stops when this is dropped.
pub struct SpeakerStream {
    _stream: Stream,
    sample_rate: u32,
}

impl SpeakerStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Opens the default input device and forwards mono f32 blocks to `blocks`.
///
/// # Errors
///
/// [`AudioError::NoDevice`] without an input device,
/// [`AudioError::PermissionDenied`] when the platform refuses access, and
/// [`AudioError::Device`] for anything else cpal reports.
pub fn open_mic(blocks: mpsc::Sender<MicBlock>) -> Result<MicStream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(AudioError::NoDevice("input"))?;
    let config = device
        .default_input_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let sample_rate = config.sample_rate().0;
    let channels = usize::from(config.channels());
    let stream_config: StreamConfig = config.clone().into();
    let err_fn = |err| error!("mic stream error: {err}");

    let forward = move |samples: Vec<f32>| {
        // A full queue means the session is behind; the block is dropped.
        let _ = blocks.try_send(MicBlock {
            sample_rate,
            samples: downmix(&samples, channels),
        });
    };

    let stream = match config.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| forward(data.to_vec()),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| {
                forward(data.iter().map(|&s| panel_core::audio::i16_to_f32(s)).collect())
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::Device(format!(
                "unsupported input sample format {other:?}"
            )))
        }
    }
    .map_err(map_build_error)?;

    stream.play().map_err(|e| AudioError::Device(e.to_string()))?;
    info!("microphone open at {sample_rate} Hz, {channels} channel(s)");
    Ok(MicStream {
        _stream: stream,
        sample_rate,
    })
}

/// Opens the default output device.  Blocks received on `blocks` are mono at
/// `source_rate`; they are resampled to the device rate and buffered in a
/// ring of `capacity` source samples.
///
/// # Errors
///
/// As for [`open_mic`].
pub fn open_speaker(
    mut blocks: mpsc::Receiver<Vec<f32>>,
    source_rate: u32,
    capacity: usize,
) -> Result<SpeakerStream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice("output"))?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    if config.sample_format() != SampleFormat::F32 {
        return Err(AudioError::Device(format!(
            "unsupported output sample format {:?}",
            config.sample_format()
        )));
    }
    let sample_rate = config.sample_rate().0;
    let channels = usize::from(config.channels()).max(1);
    let stream_config: StreamConfig = config.into();
    let mut resampler = Resampler::new(source_rate, sample_rate)?;
    let device_capacity = (capacity as f64 / resampler.ratio()).round() as usize;
    let mut buffer = PlaybackBuffer::new(device_capacity.max(1));
    let mut mono = Vec::new();

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                while let Ok(block) = blocks.try_recv() {
                    buffer.push(&resampler.process(&block));
                }
                mono.resize(data.len() / channels, 0.0);
                buffer.fill(&mut mono);
                for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                    frame.fill(sample);
                }
            },
            |err| error!("speaker stream error: {err}"),
            None,
        )
        .map_err(map_build_error)?;

    stream.play().map_err(|e| AudioError::Device(e.to_string()))?;
    info!("speaker open at {sample_rate} Hz, {channels} channel(s)");
    Ok(SpeakerStream {
        _stream: stream,
        sample_rate,
    })
}

fn map_build_error(error: cpal::BuildStreamError) -> AudioError {
    match error {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::PermissionDenied("device not available".to_string())
        }
        other => AudioError::Device(other.to_string()),
    }
}
