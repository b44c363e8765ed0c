use crate::timer::FrameTimer;

/// Damped moving average of a sender's frame rate.
///
/// Frame times are accumulated until more than `window` frames have been
/// seen, then the average is blended into the estimate with `damping`
/// weight on the previous value. Deltas larger than one happen when a
/// receiver polls slower than the sender produces.
#[derive(Debug, Clone)]
pub struct FpsEstimator {
    fps: f64,
    frame_time_total_ms: f64,
    frame_time_count: f64,
    window: f64,
    damping: f64,
    last_delta: i64,
    frames_observed: i64,
    timer: FrameTimer,
}

impl FpsEstimator {
    pub fn new(seed_fps: f64, window: u32, damping: f64) -> Self {
        Self {
            fps: seed_fps,
            frame_time_total_ms: 0.0,
            frame_time_count: 0.0,
            window: window as f64,
            damping: damping.clamp(0.0, 1.0),
            last_delta: 0,
            frames_observed: 0,
            timer: FrameTimer::start(),
        }
    }

    /// Clears the accumulators and starts again from `seed_fps`.
    pub fn reset(&mut self, seed_fps: f64) {
        self.fps = seed_fps;
        self.frame_time_total_ms = 0.0;
        self.frame_time_count = 0.0;
        self.last_delta = 0;
        self.frames_observed = 0;
        self.timer.restart();
    }

    /// Records `frames` new frames since the previous call.
    pub fn record(&mut self, frames: i64) {
        let elapsed = self.timer.lap_ms();
        self.record_elapsed(frames, elapsed);
    }

    pub(crate) fn record_elapsed(&mut self, frames: i64, elapsed_ms: f64) {
        if frames <= 0 {
            return;
        }

        self.last_delta = frames;
        self.frames_observed += frames;
        self.frame_time_total_ms += elapsed_ms;
        self.frame_time_count += frames as f64;

        if self.frame_time_count > self.window {
            let average_ms = self.frame_time_total_ms / self.frame_time_count;
            self.frame_time_total_ms = 0.0;
            self.frame_time_count = 0.0;

            let seconds = average_ms / 1000.0;
            if seconds > 0.0001 {
                self.fps = self.damping * self.fps + (1.0 - self.damping) * (1.0 / seconds);
            }
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frame delta passed by the most recent confirmed frame.
    pub fn last_delta(&self) -> i64 {
        self.last_delta
    }

    pub fn frames_observed(&self) -> i64 {
        self.frames_observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_seed_until_window_fills() {
        let mut est = FpsEstimator::new(60.0, 16, 0.85);
        for _ in 0..16 {
            est.record_elapsed(1, 10.0);
        }
        assert_eq!(est.fps(), 60.0);
        est.record_elapsed(1, 10.0);
        // 0.85 * 60 + 0.15 * 100
        assert!((est.fps() - 66.0).abs() < 1e-9);
    }

    #[test]
    fn converges_towards_observed_rate() {
        let mut est = FpsEstimator::new(60.0, 16, 0.85);
        for _ in 0..2000 {
            est.record_elapsed(1, 1000.0 / 30.0);
        }
        assert!((est.fps() - 30.0).abs() < 0.5);
    }

    #[test]
    fn multi_frame_deltas_count_every_frame() {
        let mut est = FpsEstimator::new(60.0, 16, 0.85);
        est.record_elapsed(3, 50.0);
        assert_eq!(est.last_delta(), 3);
        assert_eq!(est.frames_observed(), 3);

        est.record_elapsed(0, 5.0);
        est.record_elapsed(-2, 5.0);
        assert_eq!(est.last_delta(), 3);
        assert_eq!(est.frames_observed(), 3);
    }

    #[test]
    fn tiny_frame_times_leave_estimate_alone() {
        let mut est = FpsEstimator::new(75.0, 16, 0.85);
        for _ in 0..17 {
            est.record_elapsed(1, 0.0);
        }
        assert_eq!(est.fps(), 75.0);
    }

    #[test]
    fn reset_reseeds() {
        let mut est = FpsEstimator::new(60.0, 1, 0.0);
        est.record_elapsed(2, 10.0);
        assert!((est.fps() - 200.0).abs() < 1e-9);
        est.reset(144.0);
        assert_eq!(est.fps(), 144.0);
        assert_eq!(est.frames_observed(), 0);
    }
}
