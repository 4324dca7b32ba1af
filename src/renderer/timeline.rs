use std::time::{Duration, Instant};

/// Frame-exact clock for a capture session
///
/// Video time (`frame / fps`) drives everything that ends up in the output.
/// Program time is only kept for the FPS diagnostic.
#[derive(Debug, Clone)]
pub struct VideoClock {
    fps: u32,
    total_frames: u32,
    frame: u32,
}

impl VideoClock {
    /// Create clock for `duration_seconds` of video at `fps`
    pub fn new(fps: u32, duration_seconds: u32) -> Self {
        Self {
            fps,
            total_frames: fps * duration_seconds,
            frame: 0,
        }
    }

    /// Current zero-based frame index
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Get total frame count
    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Get FPS
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// True once every frame has been produced
    pub fn is_finished(&self) -> bool {
        self.frame >= self.total_frames
    }

    /// Video time of the current frame
    pub fn video_time(&self) -> f32 {
        self.frame_to_time(self.frame)
    }

    /// Convert frame number to time in seconds
    pub fn frame_to_time(&self, frame: u32) -> f32 {
        frame as f32 / self.fps as f32
    }

    /// Move to the next frame
    pub fn advance(&mut self) {
        self.frame += 1;
    }
}

/// Wall-clock frames-per-second counter, reported once per second.
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames_in_window: u32,
    last_fps: u32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames_in_window: 0,
            last_fps: 0,
        }
    }

    /// Count one frame; returns the new FPS value when a second has elapsed.
    pub fn tick(&mut self) -> Option<u32> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Option<u32> {
        self.frames_in_window += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed < Duration::from_secs(1) {
            return None;
        }

        self.last_fps = (self.frames_in_window as f64 / elapsed.as_secs_f64()).round() as u32;
        self.frames_in_window = 0;
        self.window_start = now;
        Some(self.last_fps)
    }

    pub fn last_fps(&self) -> u32 {
        self.last_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_frame_count() {
        let clock = VideoClock::new(60, 10);
        assert_eq!(clock.fps(), 60);
        assert_eq!(clock.total_frames(), 600);
        assert_eq!(clock.frame(), 0);
    }

    #[test]
    fn test_video_time_is_frame_over_fps() {
        let mut clock = VideoClock::new(30, 2);
        for expected in 0..60 {
            assert_eq!(clock.video_time(), expected as f32 / 30.0);
            clock.advance();
        }
        assert!(clock.is_finished());
    }

    #[test]
    fn test_fps_counter_reports_after_a_second() {
        let mut counter = FpsCounter::new();
        let start = counter.window_start;

        for i in 1..30 {
            assert_eq!(counter.tick_at(start + Duration::from_millis(i * 30)), None);
        }
        let fps = counter.tick_at(start + Duration::from_millis(1000));
        assert_eq!(fps, Some(30));
        assert_eq!(counter.last_fps(), 30);
    }
}
