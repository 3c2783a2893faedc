//! Randomised delays between browser actions.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Produces human-looking pauses.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    min: f64,
    max: f64,
}

impl Pacer {
    /// Pauses between `min` and `max` seconds.
    pub fn new(min: f64, max: f64) -> Self {
        let min = min.max(0.0);
        Self {
            min,
            max: max.max(min),
        }
    }

    /// A pacer that never sleeps.
    #[cfg(test)]
    pub fn instant() -> Self {
        Self { min: 0.0, max: 0.0 }
    }

    /// A duration uniformly drawn from the configured bounds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = if self.max > self.min {
            rng.random_range(self.min..=self.max)
        } else {
            self.min
        };
        Duration::from_secs_f64(secs)
    }

    /// Sleep for a random duration within the bounds.
    pub async fn pause(&self) {
        let delay = self.sample(&mut rand::rng());
        if delay.is_zero() {
            return;
        }
        debug!("Pausing {:.2}s", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}

/// `base` seconds shifted by up to half a second either way, never negative.
pub fn jitter<R: Rng + ?Sized>(base: f64, rng: &mut R) -> Duration {
    if base <= 0.0 {
        return Duration::ZERO;
    }
    let offset: f64 = rng.random_range(-0.5..=0.5);
    Duration::from_secs_f64((base + offset).max(0.0))
}
