/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A per-filename cache whose entries expire a fixed time after they were inserted.
//!
//! Expired entries are dropped when they are looked up, and all of them are pruned whenever a new
//! entry is inserted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct TtlCache<V> {
    ttl: Duration,
    entries: HashMap<String, (V, Instant)>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&mut self, filename: &str) -> Option<V> {
        self.get_at(filename, Instant::now())
    }

    /// Get the entry for `filename` if it has not expired by `now`. An expired entry is removed.
    pub fn get_at(&mut self, filename: &str, now: Instant) -> Option<V> {
        match self.entries.get(filename) {
            Some((value, expiry)) if now < *expiry => Some(value.clone()),
            Some(_) => {
                self.entries.remove(filename);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, filename: &str, value: V) {
        self.insert_at(filename, value, Instant::now())
    }

    pub fn insert_at(&mut self, filename: &str, value: V, now: Instant) {
        self.entries.retain(|_, (_, expiry)| now < *expiry);
        self.entries
            .insert(filename.to_string(), (value, now + self.ttl));
    }

    pub fn remove(&mut self, filename: &str) -> Option<V> {
        self.entries.remove(filename).map(|(value, _)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
