use std::f32::consts::FRAC_2_PI;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{ClipperError, Result};
use crate::scope::ScopeCollector;
use crate::smoother::{DEFAULT_RAMP_SECONDS, LinearSmoother};

/// Levels at or below this are treated as silence.
const MINUS_INFINITY_DB: f32 = -100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamId {
    Input,
    Drive,
    Mix,
    Output,
}

impl ParamId {
    pub const ALL: [ParamId; 4] = [ParamId::Input, ParamId::Drive, ParamId::Mix, ParamId::Output];

    /// Identifier used in parameter notifications and the settings file.
    pub fn key(self) -> &'static str {
        match self {
            ParamId::Input => "INPUT",
            ParamId::Drive => "DRIVE",
            ParamId::Mix => "MIX",
            ParamId::Output => "OUTPUT",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.key().eq_ignore_ascii_case(key.trim()))
    }

    pub fn label(self) -> &'static str {
        match self {
            ParamId::Input => "IN",
            ParamId::Drive => "DRIVE",
            ParamId::Mix => "MIX",
            ParamId::Output => "OUT",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            ParamId::Mix => " %",
            _ => " dB",
        }
    }

    pub fn range(self) -> RangeInclusive<f32> {
        match self {
            ParamId::Input | ParamId::Output => -30.0..=12.0,
            ParamId::Drive => 0.0..=15.0,
            ParamId::Mix => 0.0..=100.0,
        }
    }

    pub fn default_value(self) -> f32 {
        0.0
    }

    /// Snaps `value` to the parameter's integer grid inside its range.
    pub fn clamp(self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default_value();
        }
        let range = self.range();
        value.round().clamp(*range.start(), *range.end())
    }

    fn index(self) -> usize {
        match self {
            ParamId::Input => 0,
            ParamId::Drive => 1,
            ParamId::Mix => 2,
            ParamId::Output => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClipperParams {
    pub input_db: f32,
    pub drive_db: f32,
    pub mix_percent: f32,
    pub output_db: f32,
}

impl Default for ClipperParams {
    fn default() -> Self {
        Self {
            input_db: ParamId::Input.default_value(),
            drive_db: ParamId::Drive.default_value(),
            mix_percent: ParamId::Mix.default_value(),
            output_db: ParamId::Output.default_value(),
        }
    }
}

impl ClipperParams {
    pub fn get(&self, id: ParamId) -> f32 {
        match id {
            ParamId::Input => self.input_db,
            ParamId::Drive => self.drive_db,
            ParamId::Mix => self.mix_percent,
            ParamId::Output => self.output_db,
        }
    }

    pub fn set(&mut self, id: ParamId, value: f32) {
        let value = id.clamp(value);
        match id {
            ParamId::Input => self.input_db = value,
            ParamId::Drive => self.drive_db = value,
            ParamId::Mix => self.mix_percent = value,
            ParamId::Output => self.output_db = value,
        }
    }
}

/// Parameter targets written by the GUI and read by the audio thread.
///
/// Each write is a single relaxed store; the audio thread picks the value up at
/// its next block and ramps toward it.
pub struct SharedParams {
    targets: [AtomicU32; 4],
}

impl SharedParams {
    pub fn new(params: &ClipperParams) -> Self {
        let shared = Self {
            targets: std::array::from_fn(|_| AtomicU32::new(0.0_f32.to_bits())),
        };
        shared.apply(params);
        shared
    }

    pub fn get(&self, id: ParamId) -> f32 {
        f32::from_bits(self.targets[id.index()].load(Ordering::Relaxed))
    }

    pub fn set(&self, id: ParamId, value: f32) {
        self.targets[id.index()].store(id.clamp(value).to_bits(), Ordering::Relaxed);
    }

    /// Handles a `(name, value)` change notification.
    pub fn set_parameter(&self, key: &str, value: f32) -> Result<()> {
        let id = ParamId::from_key(key)
            .ok_or_else(|| ClipperError::UnknownParameter(key.to_string()))?;
        self.set(id, value);
        Ok(())
    }

    pub fn apply(&self, params: &ClipperParams) {
        for id in ParamId::ALL {
            self.set(id, params.get(id));
        }
    }

    pub fn snapshot(&self) -> ClipperParams {
        let mut params = ClipperParams::default();
        for id in ParamId::ALL {
            params.set(id, self.get(id));
        }
        params
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new(&ClipperParams::default())
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    if db > MINUS_INFINITY_DB {
        10_f32.powf(db * 0.05)
    } else {
        0.0
    }
}

/// Arctangent soft clipper normalised to (-1, 1).
#[inline]
pub fn soft_clip(sample: f32) -> f32 {
    FRAC_2_PI * sample.atan()
}

#[inline]
fn shape(sample: f32, input_gain: f32, drive_gain: f32, mix: f32, output_gain: f32) -> f32 {
    let driven = sample * input_gain;
    let wet = soft_clip(driven * drive_gain);
    (driven * (1.0 - mix) + wet * mix) * output_gain
}

pub struct ClipperEngine {
    params: Arc<SharedParams>,
    input_db: LinearSmoother,
    drive_db: LinearSmoother,
    mix: LinearSmoother,
    output_db: LinearSmoother,
}

impl ClipperEngine {
    pub fn new(params: Arc<SharedParams>, sample_rate: f32) -> Self {
        let smoother = |value: f32| {
            let mut smoother = LinearSmoother::new(value);
            smoother.reset(sample_rate, DEFAULT_RAMP_SECONDS);
            smoother
        };
        Self {
            input_db: smoother(params.get(ParamId::Input)),
            drive_db: smoother(params.get(ParamId::Drive)),
            mix: smoother(params.get(ParamId::Mix) / 100.0),
            output_db: smoother(params.get(ParamId::Output)),
            params,
        }
    }

    fn latch_targets(&mut self) {
        self.input_db.set_target(self.params.get(ParamId::Input));
        self.drive_db.set_target(self.params.get(ParamId::Drive));
        self.mix.set_target(self.params.get(ParamId::Mix) / 100.0);
        self.output_db.set_target(self.params.get(ParamId::Output));
    }

    /// Runs the clipper in place over an interleaved block.
    pub fn process_block(&mut self, data: &mut [f32], channels: usize) {
        self.latch_targets();
        for frame in data.chunks_mut(channels.max(1)) {
            let input_gain = db_to_gain(self.input_db.tick());
            let drive_gain = db_to_gain(self.drive_db.tick());
            let mix = self.mix.tick();
            let output_gain = db_to_gain(self.output_db.tick());
            for sample in frame.iter_mut() {
                *sample = shape(*sample, input_gain, drive_gain, mix, output_gain);
            }
        }
    }
}

/// Everything the audio callback runs per block: the clipper, then the scope tap
/// on channel 0 of the processed signal.
pub struct ClipperProcessor {
    engine: ClipperEngine,
    collector: ScopeCollector<f32>,
}

impl ClipperProcessor {
    pub fn new(engine: ClipperEngine, collector: ScopeCollector<f32>) -> Self {
        Self { engine, collector }
    }

    pub fn process_block(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        self.engine.process_block(data, channels);
        if channels == 1 {
            self.collector.process(data);
            return;
        }
        for frame in data.chunks(channels) {
            self.collector.push_sample(frame[0]);
        }
    }

    pub fn collector(&self) -> &ScopeCollector<f32> {
        &self.collector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_queue::{FRAME_SIZE, frame_queue};

    const SAMPLE_RATE: f32 = 48_000.0;

    fn params(input_db: f32, drive_db: f32, mix_percent: f32, output_db: f32) -> Arc<SharedParams> {
        Arc::new(SharedParams::new(&ClipperParams {
            input_db,
            drive_db,
            mix_percent,
            output_db,
        }))
    }

    fn test_signal(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * std::f32::consts::TAU * 220.0 / SAMPLE_RATE).sin() * 0.9)
            .collect()
    }

    #[test]
    fn decibels_convert_to_gain() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((db_to_gain(-6.0) - 0.501_187).abs() < 1e-5);
        assert!((db_to_gain(12.0) - 3.981_072).abs() < 1e-5);
        assert_eq!(db_to_gain(-100.0), 0.0);
        assert_eq!(db_to_gain(-120.0), 0.0);
    }

    #[test]
    fn soft_clip_is_odd_and_bounded() {
        assert_eq!(soft_clip(0.0), 0.0);
        assert!((soft_clip(1.0) - 0.5).abs() < 1e-6);
        assert_eq!(soft_clip(-0.3), -soft_clip(0.3));
        assert!(soft_clip(1.0e3) < 1.0);
        assert!(soft_clip(-1.0e3) > -1.0);
    }

    #[test]
    fn dry_mix_at_unity_passes_signal_through() {
        let mut engine = ClipperEngine::new(params(0.0, 15.0, 0.0, 0.0), SAMPLE_RATE);
        let input = test_signal(1_024);
        let mut block = input.clone();
        engine.process_block(&mut block, 1);
        assert_eq!(block, input);
    }

    #[test]
    fn full_mix_applies_the_waveshaper() {
        let mut engine = ClipperEngine::new(params(-6.0, 12.0, 100.0, 3.0), SAMPLE_RATE);
        let input = test_signal(512);
        let mut block = input.clone();
        engine.process_block(&mut block, 1);

        for (out, x) in block.iter().zip(&input) {
            let driven = x * db_to_gain(-6.0);
            let expected = soft_clip(driven * db_to_gain(12.0)) * db_to_gain(3.0);
            assert!((out - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn parameter_changes_ramp_over_twenty_milliseconds() {
        let shared = params(0.0, 0.0, 0.0, 0.0);
        let mut engine = ClipperEngine::new(Arc::clone(&shared), SAMPLE_RATE);
        shared.set(ParamId::Output, -100.0);
        assert_eq!(shared.get(ParamId::Output), -30.0);

        let mut block = vec![1.0_f32; 2_000];
        engine.process_block(&mut block, 1);

        let settled = db_to_gain(-30.0);
        assert!(block[0] > 0.99);
        assert!(block[500] < block[0] && block[500] > settled);
        assert!((block[959] - settled).abs() < 1e-6);
        assert!(block[960..].iter().all(|&s| (s - settled).abs() < 1e-6));
    }

    #[test]
    fn channels_share_one_gain_per_frame() {
        let shared = params(0.0, 0.0, 0.0, 0.0);
        let mut engine = ClipperEngine::new(Arc::clone(&shared), SAMPLE_RATE);
        shared.set(ParamId::Input, -12.0);
        let mut block = vec![0.5_f32; 2 * 256];
        engine.process_block(&mut block, 2);
        for frame in block.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn notifications_are_clamped_and_names_are_checked() {
        let shared = SharedParams::default();
        shared.set_parameter("DRIVE", 40.0).unwrap();
        shared.set_parameter("mix", 37.4).unwrap();
        shared.set_parameter("INPUT", f32::NAN).unwrap();
        assert_eq!(shared.get(ParamId::Drive), 15.0);
        assert_eq!(shared.get(ParamId::Mix), 37.0);
        assert_eq!(shared.get(ParamId::Input), 0.0);

        let err = shared.set_parameter("TONE", 1.0).unwrap_err();
        assert!(matches!(err, ClipperError::UnknownParameter(name) if name == "TONE"));
    }

    #[test]
    fn snapshot_reflects_the_latest_targets() {
        let shared = SharedParams::default();
        shared.set(ParamId::Output, 6.0);
        shared.set(ParamId::Mix, 50.0);
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.output_db, 6.0);
        assert_eq!(snapshot.mix_percent, 50.0);
        assert_eq!(snapshot.input_db, 0.0);
    }

    #[test]
    fn processor_feeds_channel_zero_to_the_scope() {
        let (producer, mut consumer) = frame_queue::<f32>();
        let engine = ClipperEngine::new(params(0.0, 0.0, 0.0, 0.0), SAMPLE_RATE);
        let mut processor = ClipperProcessor::new(engine, ScopeCollector::new(producer));

        let left = test_signal(4_096);
        let mut block: Vec<f32> = left.iter().flat_map(|&s| [s, -1.0]).collect();
        processor.process_block(&mut block, 2);
        assert!(processor.collector().frames_published() >= 1);

        let mut frame = [0.0_f32; FRAME_SIZE];
        assert!(consumer.pop(&mut frame));
        // left[0] is 0.0 and left[1] is the first sample above the trigger.
        assert_eq!(&frame[..], &left[1..1 + FRAME_SIZE]);
    }

    #[test]
    fn mono_blocks_reach_the_scope_whole() {
        let (producer, mut consumer) = frame_queue::<f32>();
        let engine = ClipperEngine::new(params(0.0, 0.0, 0.0, 0.0), SAMPLE_RATE);
        let mut processor = ClipperProcessor::new(engine, ScopeCollector::new(producer));

        let mut block = test_signal(4_096);
        let expected = block.clone();
        processor.process_block(&mut block, 1);

        let mut frame = [0.0_f32; FRAME_SIZE];
        assert!(consumer.pop(&mut frame));
        assert_eq!(&frame[..], &expected[1..1 + FRAME_SIZE]);
    }
}
