//! Identifier generation.

use crate::config::IdStrategy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of fresh identifiers.
///
/// Every value returned by `next_id` must be strictly greater than all
/// values previously returned by the same generator, so that creation order
/// can be recovered by comparing identifiers.
pub trait IdGenerator: Send + Sync {
    /// Returns the next identifier.
    fn next_id(&self) -> u64;
}

/// Counter-based generator.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    next: AtomicU64,
}

impl SequenceIdGenerator {
    /// Creates a generator whose first identifier is `start`.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Returns the identifier the next call will hand out.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for SequenceIdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Timestamp-plus-sequence generator.
///
/// Hands out the current wall clock in microseconds, or the previous value
/// plus one when the clock has not moved forward.
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    last: AtomicU64,
}

impl TimestampIdGenerator {
    /// Creates a new generator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    fn now_micros() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&self) -> u64 {
        let now = Self::now_micros();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(current) => last = current,
            }
        }
    }
}

/// Builds the generator for a configured strategy.
#[must_use]
pub fn generator_for(strategy: IdStrategy) -> Arc<dyn IdGenerator> {
    match strategy {
        IdStrategy::Sequence { start } => Arc::new(SequenceIdGenerator::new(start)),
        IdStrategy::Timestamp => Arc::new(TimestampIdGenerator::new()),
    }
}
