//! Batch suffix pool
//!
//! Hands out 3-digit suffixes (`000`-`999`) so concurrent batch folders never
//! collide. A suffix is reserved until released; when every value is taken
//! a timestamp-derived suffix is returned instead, which the pool does not track.

use chrono::Utc;
use rand::seq::IteratorRandom;
use std::collections::HashSet;

/// Pool of reservable batch suffixes
#[derive(Debug)]
pub struct SuffixPool {
    size: u16,
    reserved: HashSet<u16>,
}

impl SuffixPool {
    /// Create a pool holding `size` suffixes (at most 1000)
    #[must_use]
    pub fn new(size: u16) -> Self {
        Self {
            size: size.min(1000),
            reserved: HashSet::new(),
        }
    }

    /// Reserve a free suffix, or a timestamp fallback when exhausted
    pub fn allocate(&mut self) -> String {
        let free = (0..self.size).filter(|n| !self.reserved.contains(n));
        match free.choose(&mut rand::thread_rng()) {
            Some(n) => {
                self.reserved.insert(n);
                format!("{n:03}")
            }
            None => {
                log::warn!("Batch suffix pool exhausted, using timestamp suffix");
                Utc::now().format("t%H%M%S%3f").to_string()
            }
        }
    }

    /// Return a suffix to the pool
    ///
    /// Returns `false` if the suffix was not reserved (already released, or
    /// a timestamp fallback).
    pub fn release(&mut self, suffix: &str) -> bool {
        match suffix.parse::<u16>() {
            Ok(n) if suffix.len() == 3 => self.reserved.remove(&n),
            _ => false,
        }
    }

    /// Number of reserved suffixes
    #[must_use]
    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }
}
