use std::f32::consts::TAU;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::clipper::{ClipperEngine, ClipperProcessor, SharedParams};
use crate::error::{ClipperError, Result};
use crate::frame_queue::{FrameConsumer, FrameProducer, frame_queue};
use crate::scope::ScopeCollector;

/// Seconds of input the capture ring can hold before new blocks are dropped.
const INPUT_RING_SECONDS: f32 = 0.1;
/// Input frames converted and queued per ring commit.
const CAPTURE_CHUNK_FRAMES: usize = 64;
const TEST_TONE_HZ: f32 = 110.0;
const TEST_TONE_LEVEL: f32 = 0.5;

/// Running input and output streams. Dropping the last clone stops audio.
#[derive(Clone)]
pub struct ClipperAudio {
    _output: Arc<cpal::Stream>,
    _input: Option<Arc<cpal::Stream>>,
    pub output_device_name: String,
    /// `None` while the built-in test tone stands in for a missing input.
    pub input_device_name: Option<String>,
}

impl ClipperAudio {
    pub fn new_with_devices(
        params: Arc<SharedParams>,
        scope: FrameProducer<f32>,
        output_device: Option<&str>,
        input_device: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_output_device(&host, output_device)?;
        let resolved_device_name = device
            .name()
            .unwrap_or_else(|_| "<unknown output>".to_string());
        let supported_config = device.default_output_config()?;
        let sample_format = supported_config.sample_format();
        let config: cpal::StreamConfig = supported_config.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let (source, input_stream, input_name) = match open_input(&host, input_device, sample_rate)
        {
            Ok(capture) => (
                SignalSource::Input {
                    samples: capture.samples,
                    channels: capture.channels,
                },
                Some(Arc::new(capture.stream)),
                Some(capture.device_name),
            ),
            Err(err) => {
                log::warn!("Input unavailable ({err}), using {TEST_TONE_HZ} Hz test tone");
                (SignalSource::test_tone(sample_rate as f32), None, None)
            }
        };

        let processor = ClipperProcessor::new(
            ClipperEngine::new(params, sample_rate as f32),
            ScopeCollector::new(scope),
        );
        let callback = OutputCallback {
            processor,
            source,
            channels,
            scratch: Vec::with_capacity(channels * 4096),
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_output_stream::<f32>(&device, &config, callback)?,
            cpal::SampleFormat::I16 => build_output_stream::<i16>(&device, &config, callback)?,
            cpal::SampleFormat::U16 => build_output_stream::<u16>(&device, &config, callback)?,
            other => return Err(ClipperError::UnsupportedFormat(other)),
        };
        stream.play()?;
        if let Some(input) = &input_stream {
            input.play()?;
        }
        log::info!(
            "Audio running: output '{resolved_device_name}' at {sample_rate} Hz, {channels} ch, input {}",
            input_name.as_deref().unwrap_or("test tone")
        );

        Ok(Self {
            _output: Arc::new(stream),
            _input: input_stream,
            output_device_name: resolved_device_name,
            input_device_name: input_name,
        })
    }
}

/// Opens audio on the chosen devices together with a fresh scope queue.
pub fn start(
    params: Arc<SharedParams>,
    output_device: Option<&str>,
    input_device: Option<&str>,
) -> Result<(ClipperAudio, FrameConsumer<f32>)> {
    let (producer, consumer) = frame_queue();
    let audio = ClipperAudio::new_with_devices(params, producer, output_device, input_device)?;
    Ok((audio, consumer))
}

fn select_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    if let Some(target) = name {
        if let Some(device) = host
            .output_devices()?
            .find(|device| device.name().is_ok_and(|device_name| device_name == target))
        {
            return Ok(device);
        }
        return Err(ClipperError::DeviceNotFound(target.to_string()));
    }

    host.default_output_device()
        .ok_or(ClipperError::NoOutputDevice)
}

fn select_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    if let Some(target) = name {
        if let Some(device) = host
            .input_devices()?
            .find(|device| device.name().is_ok_and(|device_name| device_name == target))
        {
            return Ok(device);
        }
        return Err(ClipperError::DeviceNotFound(target.to_string()));
    }

    host.default_input_device().ok_or(ClipperError::NoInputDevice)
}

pub fn list_output_device_names() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect::<Vec<String>>())
        .unwrap_or_default()
}

pub fn list_input_device_names() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect::<Vec<String>>())
        .unwrap_or_default()
}

struct InputCapture {
    stream: cpal::Stream,
    samples: HeapCons<f32>,
    channels: usize,
    device_name: String,
}

/// Opens the input at the output's sample rate, feeding a lock-free sample ring.
fn open_input(host: &cpal::Host, name: Option<&str>, sample_rate: u32) -> Result<InputCapture> {
    let device = select_input_device(host, name)?;
    let device_name = device
        .name()
        .unwrap_or_else(|_| "<unknown input>".to_string());
    let supported_config = device
        .supported_input_configs()?
        .filter(|range| {
            range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate
        })
        .max_by_key(|range| range.sample_format() == cpal::SampleFormat::F32)
        .ok_or(ClipperError::SampleRateUnsupported(sample_rate))?
        .with_sample_rate(cpal::SampleRate(sample_rate));
    let sample_format = supported_config.sample_format();
    let config: cpal::StreamConfig = supported_config.into();
    let channels = config.channels as usize;

    let capacity = (sample_rate as f32 * INPUT_RING_SECONDS) as usize * channels;
    let (producer, consumer) = HeapRb::<f32>::new(capacity.max(channels)).split();

    let capture = InputRing {
        samples: producer,
        scratch: vec![0.0; CAPTURE_CHUNK_FRAMES * channels],
    };
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_input_stream::<f32>(&device, &config, capture)?,
        cpal::SampleFormat::I16 => build_input_stream::<i16>(&device, &config, capture)?,
        cpal::SampleFormat::U16 => build_input_stream::<u16>(&device, &config, capture)?,
        other => return Err(ClipperError::UnsupportedFormat(other)),
    };

    Ok(InputCapture {
        stream,
        samples: consumer,
        channels,
        device_name,
    })
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut capture: InputRing,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_fn = |err| log::error!("Audio input stream error: {err}");
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| capture.push_block(data),
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: OutputCallback,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let err_fn = |err| log::error!("Audio output stream error: {err}");
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| callback.render(data),
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Producer side of the input ring, owned by the input callback.
///
/// Samples are committed in whole input frames so the output side never sees
/// half a frame.
struct InputRing {
    samples: HeapProd<f32>,
    scratch: Vec<f32>,
}

impl InputRing {
    /// Queues one interleaved input block, or drops it whole if the ring is too full.
    fn push_block<T>(&mut self, data: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        if self.samples.vacant_len() < data.len() || self.scratch.is_empty() {
            return;
        }
        for chunk in data.chunks(self.scratch.len()) {
            let converted = &mut self.scratch[..chunk.len()];
            for (slot, &sample) in converted.iter_mut().zip(chunk) {
                *slot = f32::from_sample(sample);
            }
            self.samples.push_slice(converted);
        }
    }
}

enum SignalSource {
    Input {
        samples: HeapCons<f32>,
        channels: usize,
    },
    TestTone {
        phase: f32,
        step: f32,
    },
}

impl SignalSource {
    fn test_tone(sample_rate: f32) -> Self {
        SignalSource::TestTone {
            phase: 0.0,
            step: TEST_TONE_HZ / sample_rate,
        }
    }

    /// Fills an interleaved block with `channels` output channels.
    fn fill(&mut self, block: &mut [f32], channels: usize) {
        match self {
            SignalSource::Input {
                samples,
                channels: input_channels,
            } => {
                let input_channels = *input_channels;
                for frame in block.chunks_mut(channels) {
                    let Some(first) = samples.try_pop() else {
                        frame.fill(0.0);
                        continue;
                    };
                    frame.fill(if input_channels == 1 { first } else { 0.0 });
                    frame[0] = first;
                    for channel in 1..input_channels {
                        let sample = samples.try_pop().unwrap_or(0.0);
                        if let Some(slot) = frame.get_mut(channel) {
                            *slot = sample;
                        }
                    }
                }
            }
            SignalSource::TestTone { phase, step } => {
                for frame in block.chunks_mut(channels) {
                    frame.fill((TAU * *phase).sin() * TEST_TONE_LEVEL);
                    *phase = (*phase + *step).fract();
                }
            }
        }
    }
}

struct OutputCallback {
    processor: ClipperProcessor,
    source: SignalSource,
    channels: usize,
    scratch: Vec<f32>,
}

impl OutputCallback {
    /// Renders `data` in slices no longer than the preallocated scratch buffer.
    fn render<T>(&mut self, data: &mut [T])
    where
        T: Sample + FromSample<f32>,
    {
        let channels = self.channels.max(1);
        let slice_len = (self.scratch.capacity() / channels).max(1) * channels;
        for slice in data.chunks_mut(slice_len) {
            self.scratch.clear();
            self.scratch.resize(slice.len(), 0.0);
            self.source.fill(&mut self.scratch, channels);
            self.processor.process_block(&mut self.scratch, channels);
            for (out, &sample) in slice.iter_mut().zip(&self.scratch) {
                *out = T::from_sample(sample.clamp(-1.0, 1.0));
            }
        }
    }
}

impl Drop for OutputCallback {
    fn drop(&mut self) {
        let collector = self.processor.collector();
        log::debug!(
            "Scope collector stopped: {} frames published, {} dropped",
            collector.frames_published(),
            collector.frames_dropped()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_ring(capacity: usize, channels: usize) -> (InputRing, HeapCons<f32>) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let ring = InputRing {
            samples: producer,
            scratch: vec![0.0; 2 * channels],
        };
        (ring, consumer)
    }

    #[test]
    fn mono_input_feeds_every_output_channel() {
        let (mut ring, consumer) = input_ring(64, 1);
        ring.push_block(&[0.1_f32, 0.2, 0.3]);
        let mut source = SignalSource::Input {
            samples: consumer,
            channels: 1,
        };
        let mut block = vec![9.0_f32; 8];
        source.fill(&mut block, 2);
        assert_eq!(block, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn stereo_input_into_wider_output_clears_extra_channels() {
        let (mut ring, consumer) = input_ring(64, 2);
        ring.push_block(&[0.5_f32, -0.5, 0.25, -0.25, 0.125, -0.125]);
        let mut source = SignalSource::Input {
            samples: consumer,
            channels: 2,
        };
        let mut block = vec![9.0_f32; 9];
        source.fill(&mut block, 3);
        assert_eq!(
            block,
            vec![0.5, -0.5, 0.0, 0.25, -0.25, 0.0, 0.125, -0.125, 0.0]
        );
    }

    #[test]
    fn integer_input_is_converted_and_full_ring_drops_whole_blocks() {
        let (mut ring, mut consumer) = input_ring(4, 1);
        ring.push_block(&[i16::MAX, 0_i16, i16::MIN]);
        ring.push_block(&[1_i16, 2_i16]);
        assert!((consumer.try_pop().unwrap() - 1.0).abs() < 1e-3);
        assert_eq!(consumer.try_pop(), Some(0.0));
        assert_eq!(consumer.try_pop(), Some(-1.0));
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn oversized_blocks_render_without_growing_scratch() {
        let (producer, _consumer) = frame_queue();
        let params = Arc::new(SharedParams::default());
        let mut callback = OutputCallback {
            processor: ClipperProcessor::new(
                ClipperEngine::new(params, 48_000.0),
                ScopeCollector::new(producer),
            ),
            source: SignalSource::test_tone(48_000.0),
            channels: 2,
            scratch: Vec::with_capacity(8),
        };

        let capacity = callback.scratch.capacity();
        let mut data = vec![0.0_f32; 3 * capacity + 6];
        callback.render(&mut data);
        assert_eq!(callback.scratch.capacity(), capacity);

        // Default settings are a dry passthrough of the tone.
        let mut expected = vec![0.0_f32; data.len()];
        SignalSource::test_tone(48_000.0).fill(&mut expected, 2);
        assert_eq!(data, expected);
    }

    #[test]
    fn test_tone_stays_within_level() {
        let mut source = SignalSource::test_tone(48_000.0);
        let mut block = vec![0.0_f32; 2 * 48_000];
        source.fill(&mut block, 2);
        assert!(block.iter().all(|s| s.abs() <= TEST_TONE_LEVEL));
        assert!(block.iter().any(|&s| s > 0.49));
        assert!(block.chunks(2).all(|frame| frame[0] == frame[1]));
    }
}
