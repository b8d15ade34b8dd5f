use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeKind {
    In,
    Out,
}

/// A linear gain ramp applied on top of an object's volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fade {
    kind: FadeKind,
    duration: Duration,
    elapsed: Duration,
}

impl Fade {
    pub fn new(kind: FadeKind, duration: Duration) -> Self {
        Self { kind, duration, elapsed: Duration::ZERO }
    }

    pub fn kind(&self) -> FadeKind {
        self.kind
    }

    /// Advances the ramp. Returns `true` once it's complete.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        self.elapsed = (self.elapsed + elapsed).min(self.duration);
        self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Gain multiplier at the current point of the ramp, in `[0, 1]`.
    pub fn gain(&self) -> f32 {
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            self.elapsed.as_secs_f32() / self.duration.as_secs_f32()
        };
        match self.kind {
            FadeKind::In => progress,
            FadeKind::Out => 1.0 - progress,
        }
    }
}
