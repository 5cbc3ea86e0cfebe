//! Display side of the scope: pulls captured frames on a fixed cadence and maps
//! them into screen space.

use std::time::{Duration, Instant};

use egui::{Pos2, Rect, pos2, vec2};

use crate::frame_queue::{FRAME_SIZE, Frame, FrameConsumer};
use crate::scope::ScopeSample;

pub const DEFAULT_FRAMES_PER_SECOND: u32 = 24;
/// Fraction of the draw height a full-scale sample spans from the center line.
pub const VERTICAL_SCALER: f32 = 0.4;
const TITLE_HEIGHT: f32 = 20.0;

pub struct ScopeDisplay<T: ScopeSample> {
    queue: FrameConsumer<T>,
    samples: Box<Frame<T>>,
    frames_shown: u64,
}

impl<T: ScopeSample> ScopeDisplay<T> {
    pub fn new(queue: FrameConsumer<T>) -> Self {
        Self {
            queue,
            samples: Box::new([T::default(); FRAME_SIZE]),
            frames_shown: 0,
        }
    }

    /// Pulls the next published frame, if any. Returns whether the contents changed.
    pub fn tick(&mut self) -> bool {
        if self.queue.is_empty() || !self.queue.pop(&mut self.samples) {
            return false;
        }
        self.frames_shown += 1;
        true
    }

    /// Switches to a new queue, keeping the last frame on screen.
    pub fn attach(&mut self, queue: FrameConsumer<T>) {
        self.queue = queue;
    }

    pub fn samples(&self) -> &[T] {
        &self.samples[..]
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// Frames published but not yet pulled.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    pub fn plot(&self, area: Rect) -> Vec<Pos2> {
        plot_points(self.samples(), area, VERTICAL_SCALER)
    }
}

/// Plot area inside a scope component: below the title strip, inset 5% horizontally
/// and 1% vertically.
pub fn draw_area(bounds: Rect) -> Rect {
    let mut area = bounds;
    area.min.y = (area.min.y + TITLE_HEIGHT).min(area.max.y);
    area.shrink2(vec2(area.width() * 0.05, area.height() * 0.01))
}

/// Maps samples to a polyline spanning `area` left to right.
///
/// Samples are clamped to [-1, 1] so the trace stays inside the plot.
pub fn plot_points<T: ScopeSample>(data: &[T], area: Rect, scaler: f32) -> Vec<Pos2> {
    if data.len() < 2 {
        return Vec::new();
    }
    let last = (data.len() - 1) as f32;
    let center = area.center().y;
    let gain = area.height() * scaler;
    data.iter()
        .enumerate()
        .map(|(i, sample)| {
            let x = area.left() + area.width() * (i as f32 / last);
            let value = sample.to_f32();
            let value = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
            let y = center - gain * value;
            pos2(x, y)
        })
        .collect()
}

/// Fixed-rate tick source for the display refresh.
///
/// The GUI polls it from its repaint loop and sleeps for [`FrameTimer::until_next`];
/// dropping the timer with its owner stops the refresh.
#[derive(Debug)]
pub struct FrameTimer {
    interval: Duration,
    next_tick: Option<Instant>,
}

impl FrameTimer {
    pub fn new(frames_per_second: u32) -> Self {
        let mut timer = Self {
            interval: Duration::ZERO,
            next_tick: None,
        };
        timer.set_frames_per_second(frames_per_second);
        timer
    }

    pub fn set_frames_per_second(&mut self, frames_per_second: u32) {
        debug_assert!(
            frames_per_second > 0 && frames_per_second < 1000,
            "frame rate out of range"
        );
        let fps = frames_per_second.clamp(1, 999);
        self.interval = Duration::from_nanos(1_000_000_000 / u64::from(fps));
        self.next_tick = None;
    }

    #[cfg(test)]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true when a tick is due at `now`. The first poll always ticks;
    /// missed ticks are skipped rather than replayed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_tick {
            Some(due) if now < due => false,
            Some(due) => {
                let mut next = due + self.interval;
                if next <= now {
                    next = now + self.interval;
                }
                self.next_tick = Some(next);
                true
            }
            None => {
                self.next_tick = Some(now + self.interval);
                true
            }
        }
    }

    pub fn until_next(&self, now: Instant) -> Duration {
        self.next_tick
            .map(|due| due.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES_PER_SECOND)
    }
}
