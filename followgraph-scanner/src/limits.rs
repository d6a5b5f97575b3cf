use crate::rate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Randomized delay bounds in milliseconds, sampled from `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self { min: ms, max: ms }
    }

    pub fn sample(&self) -> Duration {
        self.sample_with(&mut fastrand::Rng::new())
    }

    /// Bounds given in the wrong order are swapped before sampling.
    pub fn sample_with(&self, rng: &mut fastrand::Rng) -> Duration {
        let (lower, upper) = if self.min > self.max {
            (self.max, self.min)
        } else {
            (self.min, self.max)
        };

        if lower == upper {
            return Duration::from_millis(lower);
        }

        Duration::from_millis(rng.u64(lower..upper))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthLimits {
    /// Breadth-first layers explored after the root's own neighbours.
    pub generations: u32,
    /// Cap on followers (and followed accounts) kept per user; 0 is unlimited.
    pub followers: usize,
}

impl Default for DepthLimits {
    fn default() -> Self {
        Self {
            generations: 1,
            followers: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    pub size: usize,
    pub count: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            size: 3000,
            count: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayLimits {
    pub images: DelayRange,
    pub pages: DelayRange,
    pub batches: DelayRange,
    pub daily: DelayRange,
}

impl Default for DelayLimits {
    fn default() -> Self {
        Self {
            images: DelayRange::new(100, 1500),
            pages: DelayRange::new(500, 2500),
            batches: DelayRange::new(25 * MINUTE_MS, 35 * MINUTE_MS),
            daily: DelayRange::new(25 * HOUR_MS, 30 * HOUR_MS),
        }
    }
}

impl DelayLimits {
    /// No waiting anywhere. Used by tests and mock runs.
    pub fn none() -> Self {
        Self {
            images: DelayRange::fixed(0),
            pages: DelayRange::fixed(0),
            batches: DelayRange::fixed(0),
            daily: DelayRange::fixed(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimits {
    pub batch: BatchLimits,
    pub parallel_tasks: usize,
    pub delay: DelayLimits,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            batch: BatchLimits::default(),
            parallel_tasks: 2,
            delay: DelayLimits::default(),
        }
    }
}

/// Everything that bounds a crawl: how far, how much, how fast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    pub depth: DepthLimits,
    pub rate: RateLimits,
    pub include_following: bool,
}

impl Limits {
    /// Worker pool size: the configured parallelism, bounded by what the
    /// batch size can absorb.
    pub fn worker_count(&self) -> usize {
        self.rate
            .parallel_tasks
            .min(rate::max_concurrency(self.rate.batch.size))
            .max(1)
    }

    pub fn with_generations(mut self, generations: u32) -> Self {
        self.depth.generations = generations;
        self
    }

    pub fn with_follower_cap(mut self, followers: usize) -> Self {
        self.depth.followers = followers;
        self
    }

    pub fn with_parallel_tasks(mut self, parallel_tasks: usize) -> Self {
        self.rate.parallel_tasks = parallel_tasks;
        self
    }

    pub fn with_batch(mut self, size: usize, count: usize) -> Self {
        self.rate.batch = BatchLimits { size, count };
        self
    }

    pub fn with_delays(mut self, delay: DelayLimits) -> Self {
        self.rate.delay = delay;
        self
    }

    pub fn with_following(mut self, include_following: bool) -> Self {
        self.include_following = include_following;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stays_in_half_open_range() {
        let range = DelayRange::new(10, 20);
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..500 {
            let ms = range.sample_with(&mut rng).as_millis();
            assert!((10..20).contains(&ms), "sampled {}", ms);
        }
    }

    #[test]
    fn test_sample_swaps_inverted_bounds() {
        let range = DelayRange::new(50, 40);
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..500 {
            let ms = range.sample_with(&mut rng).as_millis();
            assert!((40..50).contains(&ms), "sampled {}", ms);
        }
    }

    #[test]
    fn test_sample_fixed_range() {
        assert_eq!(DelayRange::fixed(300).sample(), Duration::from_millis(300));
        assert_eq!(DelayRange::fixed(0).sample(), Duration::ZERO);
    }

    #[test]
    fn test_worker_count_bounded_by_batch_size() {
        let limits = Limits::default().with_batch(100, 2).with_parallel_tasks(10);
        // (100 - 1) / 25 == 3
        assert_eq!(limits.worker_count(), 3);

        let limits = Limits::default().with_batch(3000, 15).with_parallel_tasks(4);
        assert_eq!(limits.worker_count(), 4);
    }

    #[test]
    fn test_worker_count_never_zero() {
        let limits = Limits::default().with_parallel_tasks(0);
        assert_eq!(limits.worker_count(), 1);

        let limits = Limits::default().with_batch(10, 1).with_parallel_tasks(5);
        assert_eq!(limits.worker_count(), 1);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "depth": { "generations": 3 },
            "rate": { "parallelTasks": 6, "delay": { "pages": { "min": 1, "max": 2 } } },
            "includeFollowing": true
        }"#;

        let limits: Limits = serde_json::from_str(json).unwrap();
        assert_eq!(limits.depth.generations, 3);
        assert_eq!(limits.depth.followers, 1000);
        assert_eq!(limits.rate.parallel_tasks, 6);
        assert_eq!(limits.rate.batch, BatchLimits::default());
        assert_eq!(limits.rate.delay.pages, DelayRange::new(1, 2));
        assert_eq!(limits.rate.delay.daily, DelayLimits::default().daily);
        assert!(limits.include_following);
    }

    #[test]
    fn test_serialize_uses_camel_case() {
        let value = serde_json::to_value(Limits::default()).unwrap();
        assert!(value.get("includeFollowing").is_some());
        assert!(value["rate"].get("parallelTasks").is_some());
        assert_eq!(value["rate"]["batch"]["size"], 3000);
    }
}
