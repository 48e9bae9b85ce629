use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Frame rate and render cost, summarized into the window title twice a second.
pub struct FrameTiming {
    base_title: String,
    window_start: Instant,
    frames: u32,
    render_total: Duration,
}

impl FrameTiming {
    pub fn new(base_title: impl Into<String>, now: Instant) -> Self {
        Self {
            base_title: base_title.into(),
            window_start: now,
            frames: 0,
            render_total: Duration::ZERO,
        }
    }

    /// Count one frame. Returns a fresh title once per reporting interval.
    pub fn record(&mut self, now: Instant, render_time: Duration) -> Option<String> {
        self.frames = self.frames.saturating_add(1);
        self.render_total += render_time;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < REPORT_INTERVAL {
            return None;
        }
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        let render_ms = self.render_total.as_secs_f32() * 1000.0 / self.frames as f32;
        self.frames = 0;
        self.render_total = Duration::ZERO;
        self.window_start = now;
        Some(format!(
            "{} - {:.1} fps (render {:.2} ms)",
            self.base_title, fps, render_ms
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::FrameTiming;
    use std::time::{Duration, Instant};

    #[test]
    fn reports_average_after_interval() {
        let start = Instant::now();
        let mut timing = FrameTiming::new("envscene", start);
        for frame in 1..10 {
            let now = start + Duration::from_millis(50 * frame);
            assert_eq!(timing.record(now, Duration::from_millis(2)), None);
        }
        let title = timing
            .record(start + Duration::from_millis(500), Duration::from_millis(2))
            .unwrap();
        assert_eq!(title, "envscene - 20.0 fps (render 2.00 ms)");
    }

    #[test]
    fn counters_reset_after_report() {
        let start = Instant::now();
        let mut timing = FrameTiming::new("envscene", start);
        assert!(timing
            .record(start + Duration::from_secs(1), Duration::from_millis(4))
            .is_some());
        assert_eq!(
            timing.record(start + Duration::from_millis(1100), Duration::ZERO),
            None
        );
    }
}
