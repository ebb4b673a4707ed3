//! Frame pacing: limits emulation to the refresh rate of the video standard and measures FPS.

use crate::Shared;
use std::time::{Duration, Instant};
use tracing::trace;

/// Paces VIs to wall clock time.
#[derive(Debug, Clone)]
pub struct Pacer {
    /// VIs per second of the video standard.
    rate: u32,
    frame_start: Instant,
    second_start: Instant,
    /// VIs since `second_start`.
    frames: u32,
}

impl Pacer {
    pub fn new(rate: u32) -> Self {
        let now = Instant::now();
        Self {
            rate: rate.max(1),
            frame_start: now,
            second_start: now,
            frames: 0,
        }
    }

    /// Wall clock duration of a single VI.
    #[inline(always)]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.rate
    }

    /// Accounts for a VI. Publishes the FPS once per second and, if limiting is enabled, sleeps
    /// for what remains of the frame.
    pub fn frame(&mut self, shared: &Shared) {
        self.frames += 1;

        let elapsed = self.second_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f32 / elapsed.as_secs_f32();
            trace!("{fps:.2} VIs per second");
            shared.set_fps(fps);

            self.frames = 0;
            self.second_start = Instant::now();
        }

        if shared.limit_fps() {
            let target = self.frame_duration();
            let spent = self.frame_start.elapsed();
            if let Some(remaining) = target.checked_sub(spent) {
                std::thread::sleep(remaining);
            }
        }

        self.frame_start = Instant::now();
    }
}
