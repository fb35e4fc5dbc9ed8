use std::time::{Duration, Instant};

/// Smallest dt reported; tight loops otherwise produce zero deltas.
const MIN_DT: Duration = Duration::from_micros(100);

/// Largest dt reported; keeps animation state sane after a debugger pause
/// or a long stall.
const MAX_DT: Duration = Duration::from_millis(250);

/// Wall-clock frame timer.
///
/// One instance per render loop; [`tick`](Self::tick) once per frame. The
/// orchestrator substitutes a configured fixed dt for the returned value
/// when deterministic timing is requested.
#[derive(Debug)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous tick, clamped to a sane range.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last).clamp(MIN_DT, MAX_DT);
        self.last = now;
        dt.as_secs_f64()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_stays_inside_the_clamp_range() {
        let mut clock = FrameClock::new();
        // Back-to-back ticks land under the floor and report it instead.
        clock.tick();
        let dt = clock.tick();
        assert!(dt >= MIN_DT.as_secs_f64());
        assert!(dt <= MAX_DT.as_secs_f64());
    }
}
