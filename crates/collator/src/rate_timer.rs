//! Sensor rate bookkeeping for diagnostic logs.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use contracts::Time;
use observability::RunningStats;

#[derive(Debug, Clone, Copy)]
struct Pulse {
    time: Time,
    wall_time: Instant,
}

/// Tracks the sample times of one sensor over a sliding window of sample time.
#[derive(Debug, Clone)]
pub struct RateTimer {
    window: Duration,
    pulses: VecDeque<Pulse>,
}

impl RateTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pulses: VecDeque::new(),
        }
    }

    /// Records a sample with timestamp `time` observed at `wall_time`, then
    /// evicts pulses more than one window older than `time`.
    ///
    /// The window is measured in sample time, so replaying a log faster than
    /// real time cannot grow it.
    pub fn pulse(&mut self, time: Time, wall_time: Instant) {
        self.pulses.push_back(Pulse { time, wall_time });
        let oldest = time - self.window;
        while self.pulses.front().is_some_and(|pulse| pulse.time < oldest) {
            self.pulses.pop_front();
        }
    }

    pub fn num_pulses(&self) -> usize {
        self.pulses.len()
    }

    /// Samples per second of sample time, 0 with fewer than two pulses.
    pub fn compute_rate(&self) -> f64 {
        let span = self.time_span_seconds();
        if self.pulses.len() < 2 || span <= 0.0 {
            return 0.0;
        }
        (self.pulses.len() - 1) as f64 / span
    }

    /// Sample time elapsed per second of wall time, 0 while no wall time has
    /// passed across the window.
    pub fn compute_wall_time_rate_ratio(&self) -> f64 {
        let wall = self.wall_span().as_secs_f64();
        if self.pulses.len() < 2 || wall <= 0.0 {
            return 0.0;
        }
        self.time_span_seconds() / wall
    }

    /// `"<rate> Hz <mean> ms +/- <stddev> ms (pulsed at <ratio>% real time)"`,
    /// or `"unknown"` until two pulses were seen.
    pub fn debug_string(&self) -> String {
        if self.pulses.len() < 2 {
            return "unknown".to_string();
        }

        let mut deltas = RunningStats::default();
        for (earlier, later) in self.pulses.iter().zip(self.pulses.iter().skip(1)) {
            deltas.push(later.time.seconds_since(earlier.time));
        }

        format!(
            "{:.2} Hz {:.2} ms +/- {:.2} ms (pulsed at {:.2}% real time)",
            self.compute_rate(),
            deltas.mean() * 1e3,
            deltas.std_dev() * 1e3,
            self.compute_wall_time_rate_ratio() * 100.0
        )
    }

    fn time_span_seconds(&self) -> f64 {
        match (self.pulses.front(), self.pulses.back()) {
            (Some(first), Some(last)) => last.time.seconds_since(first.time),
            _ => 0.0,
        }
    }

    fn wall_span(&self) -> Duration {
        match (self.pulses.front(), self.pulses.back()) {
            (Some(first), Some(last)) => last.wall_time.saturating_duration_since(first.wall_time),
            _ => Duration::ZERO,
        }
    }
}
