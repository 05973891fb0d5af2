//! Frame timing.

use instant::Instant;

/// Wall clock driven timer. Tests and offline renders can drive it manually
/// through [`advance`](Self::advance) instead of [`tick`](Self::tick).
#[derive(Debug, Clone)]
pub struct GameTimer {
    last: Instant,
    total: f32,
    delta: f32,
    stopped: bool,
}

impl Default for GameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl GameTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            total: 0.0,
            delta: 0.0,
            stopped: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn start(&mut self) {
        if self.stopped {
            self.last = Instant::now();
            self.stopped = false;
        }
    }

    /// Measures the time since the previous tick and returns it in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = if self.stopped {
            0.0
        } else {
            now.duration_since(self.last).as_secs_f32()
        };
        self.last = now;
        self.advance(dt)
    }

    pub fn advance(&mut self, dt: f32) -> f32 {
        self.delta = dt.max(0.0);
        self.total += self.delta;
        self.delta
    }

    pub fn delta_time(&self) -> f32 {
        self.delta
    }

    pub fn total_time(&self) -> f32 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_advance_accumulates() {
        let mut timer = GameTimer::new();
        timer.advance(0.25);
        timer.advance(0.5);
        assert_eq!(timer.total_time(), 0.75);
        assert_eq!(timer.delta_time(), 0.5);
        timer.advance(-1.0);
        assert_eq!(timer.total_time(), 0.75);
    }

    #[test]
    fn stopped_timer_does_not_advance() {
        let mut timer = GameTimer::new();
        timer.stop();
        assert_eq!(timer.tick(), 0.0);
    }
}
