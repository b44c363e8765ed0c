use std::time::{Duration, Instant};

/// Monotonic stopwatch measuring milliseconds since its last restart.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimer {
    start: Instant,
}

impl FrameTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the elapsed milliseconds and restarts in one step.
    pub fn lap_ms(&mut self) -> f64 {
        let now = Instant::now();
        let lap = now.duration_since(self.start).as_secs_f64() * 1000.0;
        self.start = now;
        lap
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::start()
    }
}

/// Refresh rate of the primary display in Hz, or `fallback` when it cannot be queried.
#[cfg(windows)]
pub fn display_refresh_rate(fallback: f64) -> f64 {
    use windows::core::PCWSTR;
    use windows::Win32::Graphics::Gdi::{EnumDisplaySettingsW, DEVMODEW, ENUM_CURRENT_SETTINGS};

    unsafe {
        let mut mode: DEVMODEW = std::mem::zeroed();
        mode.dmSize = std::mem::size_of::<DEVMODEW>() as u16;
        if EnumDisplaySettingsW(PCWSTR::null(), ENUM_CURRENT_SETTINGS, &mut mode).as_bool() {
            // 0 and 1 mean "hardware default"
            if mode.dmDisplayFrequency > 1 {
                return mode.dmDisplayFrequency as f64;
            }
        }
    }
    fallback
}

#[cfg(not(windows))]
pub fn display_refresh_rate(fallback: f64) -> f64 {
    fallback
}
