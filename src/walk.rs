//! Random-walk candidate selection.
//!
//! A strictly linear pass over search results looks robotic. The walker keeps
//! three bounded pools and mixes them the way a person browses:
//!
//! - **primary**: search results, in page order (or shuffled),
//! - **related**: pins found on detail pages, most recent first,
//! - **history**: pins already visited, occasionally revisited.
//!
//! Each pin is handed out for scoring at most once.

use crate::models::{Pin, PoolSource};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashSet, VecDeque};

/// Probabilities and limits of the walk.
#[derive(Debug, Clone, Copy)]
pub struct WalkConfig {
    /// Chance of preferring the related pool over the primary one.
    pub random_walk_probability: f64,
    /// Chance of revisiting a pin from history instead.
    pub revisit_probability: f64,
    /// Maximum size of each pool.
    pub capacity: usize,
}

impl From<&crate::config::SearchConfig> for WalkConfig {
    fn from(config: &crate::config::SearchConfig) -> Self {
        Self {
            random_walk_probability: config.random_walk_probability,
            revisit_probability: config.revisit_probability,
            capacity: config.pool_capacity.max(1),
        }
    }
}

/// What the crawler should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Visit and score a new pin.
    Visit { pin: Pin, source: PoolSource },
    /// Go back to an already scored pin without scoring it again.
    Revisit(Pin),
}

/// The candidate pools.
#[derive(Debug)]
pub struct Walker {
    config: WalkConfig,
    primary: VecDeque<Pin>,
    related: VecDeque<Pin>,
    history: VecDeque<Pin>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl Walker {
    pub fn new(config: WalkConfig) -> Self {
        Self {
            config,
            primary: VecDeque::new(),
            related: VecDeque::new(),
            history: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
        }
    }

    /// Queue search results. Once the primary pool is full, later results
    /// are dropped so page order is kept. Returns how many were queued.
    pub fn seed(&mut self, pins: impl IntoIterator<Item = Pin>) -> usize {
        let mut added = 0;
        for pin in pins {
            if self.primary.len() >= self.config.capacity {
                break;
            }
            if self.claim(&pin) {
                self.primary.push_back(pin);
                added += 1;
            }
        }
        added
    }

    /// Shuffle the primary pool.
    pub fn shuffle_primary<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.primary.make_contiguous().shuffle(rng);
    }

    /// Queue pins discovered on a detail page. When the related pool is
    /// full the oldest discovery is dropped. Returns how many were queued.
    pub fn add_related(&mut self, pins: impl IntoIterator<Item = Pin>) -> usize {
        let mut added = 0;
        for pin in pins {
            if !self.claim(&pin) {
                continue;
            }
            if self.related.len() >= self.config.capacity {
                if let Some(old) = self.related.pop_front() {
                    self.queued.remove(old.key());
                }
            }
            self.related.push_back(pin);
            added += 1;
        }
        added
    }

    /// Record a scored pin so it can be revisited later. Pins handed out by
    /// [`Walker::next`] are already barred from being queued again.
    pub fn mark_visited(&mut self, pin: &Pin) {
        self.visited.insert(pin.key().to_string());
        if self.history.len() >= self.config.capacity {
            self.history.pop_front();
        }
        self.history.push_back(pin.clone());
    }

    /// Pick the next step, or `None` once both candidate pools are empty.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Step> {
        if self.is_exhausted() {
            return None;
        }

        let roll: f64 = rng.random();

        if roll < self.config.revisit_probability && !self.history.is_empty() {
            let i = rng.random_range(0..self.history.len());
            return Some(Step::Revisit(self.history[i].clone()));
        }

        let order = if roll < self.config.revisit_probability + self.config.random_walk_probability
        {
            [PoolSource::Related, PoolSource::Primary]
        } else {
            [PoolSource::Primary, PoolSource::Related]
        };

        for source in order {
            if let Some(pin) = self.take(source) {
                return Some(Step::Visit { pin, source });
            }
        }

        None
    }

    /// True when there is nothing left to score.
    pub fn is_exhausted(&self) -> bool {
        self.primary.is_empty() && self.related.is_empty()
    }

    /// Sizes of the primary, related and history pools.
    pub fn pool_sizes(&self) -> (usize, usize, usize) {
        (self.primary.len(), self.related.len(), self.history.len())
    }

    /// Reserve a pin's key; false if it is already queued or visited.
    fn claim(&mut self, pin: &Pin) -> bool {
        let key = pin.key();
        if key.is_empty() || self.visited.contains(key) || self.queued.contains(key) {
            return false;
        }
        self.queued.insert(key.to_string());
        true
    }

    fn take(&mut self, source: PoolSource) -> Option<Pin> {
        let pin = match source {
            PoolSource::Primary => self.primary.pop_front(),
            // Follow the most recently discovered link.
            PoolSource::Related => self.related.pop_back(),
        }?;
        let key = pin.key().to_string();
        self.queued.remove(&key);
        self.visited.insert(key);
        Some(pin)
    }
}
