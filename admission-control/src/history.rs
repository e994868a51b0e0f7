//! Bounded trailing activity history

use crate::types::ActivityEvent;
use std::collections::VecDeque;

/// Fixed-capacity FIFO of recent activity; the oldest event is evicted first
#[derive(Debug, Clone)]
pub struct ActivityHistory {
    events: VecDeque<ActivityEvent>,
    capacity: usize,
}

impl ActivityHistory {
    /// Create an empty history
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an event, evicting the oldest when full
    pub fn push(&mut self, event: ActivityEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The last `n` events, oldest first; `None` if fewer are retained
    pub fn tail(&self, n: usize) -> Option<impl Iterator<Item = &ActivityEvent> + '_> {
        if n == 0 || self.events.len() < n {
            return None;
        }
        Some(self.events.iter().skip(self.events.len() - n))
    }

    /// Span in milliseconds between the earliest and latest of the last `n` events
    pub fn tail_span_ms(&self, n: usize) -> Option<i64> {
        let mut events = self.tail(n)?;
        let first = events.next()?.observed_at;
        let (min, max) = events.fold((first, first), |(min, max), e| {
            (min.min(e.observed_at), max.max(e.observed_at))
        });
        Some((max - min).num_milliseconds())
    }

    /// Length of the run of identical kinds ending at the newest event,
    /// counted within the last `n` events
    pub fn trailing_run(&self, n: usize) -> usize {
        let mut newest_first = self.events.iter().rev().take(n);
        let Some(last) = newest_first.next() else {
            return 0;
        };
        1 + newest_first.take_while(|e| e.kind == last.kind).count()
    }
}
