//! Sleep-based rate limiting between requests

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Deserializer};

use crate::shutdown::is_shutdown_requested;

/// Sleep granularity so a shutdown request is noticed quickly
const SLICE: Duration = Duration::from_millis(100);

/// Uniform random delay window in seconds, written as `[min, max]` (or a
/// single number for a fixed delay) in config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl<'de> Deserialize<'de> for DelayRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Spec {
            Fixed(f64),
            Range([f64; 2]),
        }
        Ok(match Spec::deserialize(deserializer)? {
            Spec::Fixed(secs) => Self::fixed(secs),
            Spec::Range([a, b]) => Self::new(a, b),
        })
    }
}

impl DelayRange {
    /// Bounds are clamped to be non-negative and swapped if reversed.
    pub fn new(min: f64, max: f64) -> Self {
        let (min, max) = (min.max(0.0), max.max(0.0));
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Fixed delay
    pub fn fixed(secs: f64) -> Self {
        Self::new(secs, secs)
    }

    pub fn zero() -> Self {
        Self::fixed(0.0)
    }

    pub fn sample(&self) -> Duration {
        let secs = if self.max > self.min {
            rand::thread_rng().gen_range(self.min..self.max)
        } else {
            self.min
        };
        Duration::from_secs_f64(secs)
    }
}

impl std::fmt::Display for DelayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.min == self.max {
            write!(f, "{}s", self.min)
        } else {
            write!(f, "{}-{}s", self.min, self.max)
        }
    }
}

/// Sleep for a random duration from `range`, returning early on shutdown.
pub fn pace(range: DelayRange) {
    sleep_interruptible(range.sample());
}

/// Sleep in short slices, stopping as soon as shutdown is requested.
pub fn sleep_interruptible(total: Duration) {
    let deadline = Instant::now() + total;
    while !is_shutdown_requested() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_bounds_are_swapped() {
        let r = DelayRange::new(7.0, 3.0);
        assert_eq!(r.min, 3.0);
        assert_eq!(r.max, 7.0);
    }

    #[test]
    fn negative_bounds_clamped() {
        let r = DelayRange::new(-1.0, 2.0);
        assert_eq!(r.min, 0.0);
    }

    #[test]
    fn sample_within_range() {
        let r = DelayRange::new(3.0, 7.0);
        for _ in 0..100 {
            let d = r.sample();
            assert!(d >= Duration::from_secs(3));
            assert!(d < Duration::from_secs(7));
        }
    }

    #[test]
    fn fixed_sample_is_exact() {
        assert_eq!(DelayRange::fixed(3.0).sample(), Duration::from_secs(3));
    }

    #[test]
    fn deserialize_from_pair_or_number() {
        #[derive(Deserialize)]
        struct Wrap {
            delay: DelayRange,
        }
        let w: Wrap = serde_json::from_str(r#"{"delay": [10, 20]}"#).unwrap();
        assert_eq!(w.delay, DelayRange::new(10.0, 20.0));
        let w: Wrap = serde_json::from_str(r#"{"delay": 3}"#).unwrap();
        assert_eq!(w.delay, DelayRange::fixed(3.0));
    }

    #[test]
    fn zero_sleep_returns() {
        let start = Instant::now();
        pace(DelayRange::zero());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn display_formats() {
        assert_eq!(DelayRange::new(3.0, 7.0).to_string(), "3-7s");
        assert_eq!(DelayRange::fixed(1.5).to_string(), "1.5s");
    }
}
