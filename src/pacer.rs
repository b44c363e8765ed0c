use crate::timer::FrameTimer;
use std::time::Duration;

/// Caps the calling loop at a target frame rate.
///
/// Only the thread calling [`FramePacer::hold_fps`] is affected. It is meant
/// for senders without their own frame rate control, and favours steady
/// pacing over precision.
#[derive(Debug, Default)]
pub struct FramePacer {
    target_fps: i32,
    frame_budget: Duration,
    frame_start: Option<FrameTimer>,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once per loop iteration. The first call of a session only records
    /// the start time; later calls sleep out the rest of the frame budget.
    pub fn hold_fps(&mut self, fps: i32) {
        if fps <= 0 {
            return;
        }

        match self.frame_start.as_mut() {
            Some(start) if fps == self.target_fps => {
                let elapsed = start.elapsed();
                if elapsed < self.frame_budget {
                    spin_sleep::sleep(self.frame_budget - elapsed);
                }
                start.restart();
            }
            _ => {
                self.target_fps = fps;
                self.frame_budget = Duration::from_secs_f64(1.0 / fps as f64);
                self.frame_start = Some(FrameTimer::start());
                crate::log_info!(
                    "Holding {} fps ({:.3} ms per frame)",
                    fps,
                    self.frame_budget.as_secs_f64() * 1000.0
                );
            }
        }
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }
}
