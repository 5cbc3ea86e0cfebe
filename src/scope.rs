use crate::frame_queue::{FRAME_SIZE, Frame, FrameProducer};

/// Sample types the scope can capture and draw.
pub trait ScopeSample: Copy + Default + PartialOrd + Send + 'static {
    /// Level whose upward crossing starts a capture.
    const TRIGGER_LEVEL: Self;

    fn to_f32(self) -> f32;
}

impl ScopeSample for f32 {
    const TRIGGER_LEVEL: Self = 0.001;

    fn to_f32(self) -> f32 {
        self
    }
}

impl ScopeSample for f64 {
    const TRIGGER_LEVEL: Self = 0.001;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorState {
    WaitingForTrigger,
    Collecting,
}

/// Captures one frame per rising-edge trigger and hands it to the display.
///
/// Runs on the audio thread: never blocks, never allocates after construction.
pub struct ScopeCollector<T: ScopeSample> {
    queue: FrameProducer<T>,
    frame: Box<Frame<T>>,
    collected: usize,
    state: CollectorState,
    // None right after a frame completes, so the next sample cannot trigger.
    previous: Option<T>,
    frames_published: u64,
    frames_dropped: u64,
}

impl<T: ScopeSample> ScopeCollector<T> {
    pub fn new(queue: FrameProducer<T>) -> Self {
        Self {
            queue,
            frame: Box::new([T::default(); FRAME_SIZE]),
            collected: 0,
            state: CollectorState::WaitingForTrigger,
            previous: None,
            frames_published: 0,
            frames_dropped: 0,
        }
    }

    /// Feeds a chunk of any length; state carries over between calls.
    pub fn process(&mut self, data: &[T]) {
        for &sample in data {
            self.push_sample(sample);
        }
    }

    #[inline]
    pub fn push_sample(&mut self, sample: T) {
        match self.state {
            CollectorState::WaitingForTrigger => {
                if self.is_rising_edge(sample) {
                    self.collected = 0;
                    self.state = CollectorState::Collecting;
                    self.append(sample);
                } else {
                    self.previous = Some(sample);
                }
            }
            CollectorState::Collecting => self.append(sample),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    fn is_rising_edge(&self, sample: T) -> bool {
        matches!(self.previous, Some(previous) if previous < T::TRIGGER_LEVEL)
            && sample >= T::TRIGGER_LEVEL
    }

    fn append(&mut self, sample: T) {
        self.frame[self.collected] = sample;
        self.collected += 1;
        if self.collected == FRAME_SIZE {
            self.publish();
        }
    }

    fn publish(&mut self) {
        if self.queue.push(&self.frame[..]) {
            self.frames_published += 1;
        } else {
            self.frames_dropped += 1;
        }
        self.collected = 0;
        self.state = CollectorState::WaitingForTrigger;
        self.previous = None;
    }
}
