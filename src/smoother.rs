/// Ramp length used for every clipper parameter.
pub const DEFAULT_RAMP_SECONDS: f32 = 0.02;

/// A value that moves toward its target in equal steps over a fixed number of samples.
#[derive(Clone, Debug)]
pub struct LinearSmoother {
    current: f32,
    target: f32,
    step: f32,
    ramp_samples: u32,
    remaining: u32,
}

impl LinearSmoother {
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            ramp_samples: 0,
            remaining: 0,
        }
    }

    /// Sets the ramp length and snaps to the current target.
    pub fn reset(&mut self, sample_rate: f32, ramp_seconds: f32) {
        self.ramp_samples = (sample_rate * ramp_seconds).round().max(0.0) as u32;
        self.set_immediate(self.target);
    }

    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
    }

    /// Starts a new ramp from wherever the value currently is.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        if self.ramp_samples == 0 {
            self.set_immediate(target);
            return;
        }
        self.target = target;
        self.remaining = self.ramp_samples;
        self.step = (self.target - self.current) / self.remaining as f32;
    }

    /// Advances one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        if self.remaining == 0 {
            return self.target;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.current = self.target;
        } else {
            self.current += self.step;
        }
        self.current
    }

    #[cfg(test)]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[cfg(test)]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[cfg(test)]
    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }
}
