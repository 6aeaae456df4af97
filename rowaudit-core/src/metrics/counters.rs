//! Lock-free dealt/neat/dirty counter triples.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::CounterSnapshot;

/// Three independently atomic counters.
///
/// Writers bump `dealt` before the outcome counter and readers load the
/// outcome counters before `dealt`, so an observed snapshot never has
/// `neat + dirty > dealt`, even while rows are in flight.
#[derive(Debug, Default)]
pub struct Counters {
    dealt: AtomicU64,
    neat: AtomicU64,
    dirty: AtomicU64,
}

impl Counters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_dealt(&self) {
        self.dealt.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_neat(&self) {
        self.neat.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_dirty(&self) {
        self.dirty.fetch_add(1, Ordering::SeqCst);
    }

    /// Records one evaluated value: one unit to dealt and one to the outcome.
    pub fn record(&self, passed: bool) {
        self.increment_dealt();
        if passed {
            self.increment_neat();
        } else {
            self.increment_dirty();
        }
    }

    /// Captures the current values.
    pub fn snapshot(&self) -> CounterSnapshot {
        let neat = self.neat.load(Ordering::SeqCst);
        let dirty = self.dirty.load(Ordering::SeqCst);
        let dealt = self.dealt.load(Ordering::SeqCst);
        CounterSnapshot { dealt, neat, dirty }
    }

    /// Removes exactly the amounts in `taken`, keeping anything counted since
    /// that snapshot was captured.
    pub fn drain(&self, taken: &CounterSnapshot) {
        // saturating: a reset() racing the flush may already have zeroed us
        saturating_sub(&self.neat, taken.neat);
        saturating_sub(&self.dirty, taken.dirty);
        saturating_sub(&self.dealt, taken.dealt);
    }

    /// Zeroes all counters.
    pub fn reset(&self) {
        self.neat.store(0, Ordering::SeqCst);
        self.dirty.store(0, Ordering::SeqCst);
        self.dealt.store(0, Ordering::SeqCst);
    }

    /// Current dealt count.
    pub fn dealt(&self) -> u64 {
        self.dealt.load(Ordering::SeqCst)
    }
}

fn saturating_sub(counter: &AtomicU64, amount: u64) {
    if amount == 0 {
        return;
    }
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        Some(current.saturating_sub(amount))
    });
}
