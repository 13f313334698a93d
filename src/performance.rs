use std::collections::VecDeque;

use wasm_bindgen::prelude::*;

const WINDOW_MS: f64 = 1000.0;

/// Milliseconds from the page's high resolution clock.
#[cfg(target_arch = "wasm32")]
pub fn now() -> f64 {
    web_sys::window()
        .and_then(|window| window.performance())
        .map_or(0.0, |performance| performance.now())
}

#[wasm_bindgen]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceSnapshot {
    pub timestamp: f64,     // Milliseconds since the first frame
    pub fps: f64,           // Frames in the last second
    pub frame_time_ms: f64, // Average frame interval in the window
    pub min_frame_time: f64,
    pub max_frame_time: f64,
    pub frame_count: u32,
}

/// Frame-to-frame timing. `tick` gives the instantaneous rate shown in the
/// FPS label; `snapshot` summarizes the last second.
#[derive(Debug, Default)]
pub struct FrameTimer {
    frame_times: VecDeque<(f64, f64)>, // (timestamp, interval) in milliseconds
    session_start: Option<f64>,
    last_frame: Option<f64>,
    total_frames: u32,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame at `now` and returns 1000 / Δt, or `None` for the
    /// first frame or a non-advancing clock.
    pub fn tick(&mut self, now: f64) -> Option<f64> {
        self.session_start.get_or_insert(now);
        self.total_frames += 1;
        let previous = self.last_frame.replace(now)?;

        let interval = now - previous;
        if interval <= 0.0 {
            return None;
        }

        self.frame_times.push_back((now, interval));
        let cutoff = now - WINDOW_MS;
        while let Some(&(timestamp, _)) = self.frame_times.front() {
            if timestamp < cutoff {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
        Some(1000.0 / interval)
    }

    pub fn snapshot(&self, now: f64) -> PerformanceSnapshot {
        let timestamp = now - self.session_start.unwrap_or(now);
        if self.frame_times.is_empty() {
            return PerformanceSnapshot {
                timestamp,
                frame_count: self.total_frames,
                ..Default::default()
            };
        }

        let window_size = self.frame_times.len() as f64;
        let intervals = self.frame_times.iter().map(|&(_, interval)| interval);
        let total: f64 = intervals.clone().sum();
        PerformanceSnapshot {
            timestamp,
            fps: window_size,
            frame_time_ms: total / window_size,
            min_frame_time: intervals.clone().fold(f64::INFINITY, f64::min),
            max_frame_time: intervals.fold(0.0, f64::max),
            frame_count: self.total_frames,
        }
    }
}

pub fn fps_label(fps: f64) -> String {
    format!("FPS: {}", fps.round())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_milliseconds_reads_as_63_fps() {
        let mut timer = FrameTimer::new();
        assert_eq!(timer.tick(100.0), None);
        let fps = timer.tick(116.0).unwrap();
        assert_eq!(fps, 62.5);
        assert_eq!(fps.round(), 63.0);
        assert_eq!(fps_label(fps), "FPS: 63");
    }

    #[test]
    fn stalled_clock_reports_nothing() {
        let mut timer = FrameTimer::new();
        timer.tick(5.0);
        assert_eq!(timer.tick(5.0), None);
    }

    #[test]
    fn snapshot_covers_the_last_second() {
        let mut timer = FrameTimer::new();
        let mut t = 0.0;
        timer.tick(t);
        for _ in 0..100 {
            t += 20.0;
            timer.tick(t);
        }
        let snapshot = timer.snapshot(t);
        assert_eq!(snapshot.frame_count, 101);
        assert_eq!(snapshot.fps, 51.0);
        assert_eq!(snapshot.frame_time_ms, 20.0);
        assert_eq!(snapshot.min_frame_time, 20.0);
        assert_eq!(snapshot.max_frame_time, 20.0);
        assert_eq!(snapshot.timestamp, 2000.0);
    }

    #[test]
    fn empty_snapshot() {
        let timer = FrameTimer::new();
        let snapshot = timer.snapshot(50.0);
        assert_eq!(snapshot, PerformanceSnapshot::default());
    }
}
