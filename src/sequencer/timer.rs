/// Single-threaded timer queue
///
/// Deferred work is stored as plain data tagged with a due time. The owner
/// pops whatever is due and acts on it; nothing here runs callbacks itself.
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<T> {
    due: f64,
    id: TimerId,
    payload: T,
}

// Min-heap on (due, id): earliest first, insertion order breaks ties.
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Entry<T> {}

#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    cancelled: HashSet<TimerId>,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, due: f64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Entry { due, id, payload });
        id
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if id.0 >= self.next_id || !self.heap.iter().any(|e| e.id == id) {
            return false;
        }
        self.cancelled.insert(id)
    }

    /// Drop every pending timer whose payload matches.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        let cancelled = &self.cancelled;
        let entries: Vec<_> = self
            .heap
            .drain()
            .filter(|e| !cancelled.contains(&e.id) && keep(&e.payload))
            .collect();
        self.heap = entries.into();
        self.cancelled.clear();
    }

    /// Pop the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(TimerId, T)> {
        loop {
            let due = self.heap.peek()?.due;
            if due > now {
                return None;
            }
            let entry = self.heap.pop()?;
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            return Some((entry.id, entry.payload));
        }
    }

    pub fn next_due(&mut self) -> Option<f64> {
        while let Some(entry) = self.heap.peek() {
            if self.cancelled.contains(&entry.id) {
                let id = entry.id;
                self.heap.pop();
                self.cancelled.remove(&id);
                continue;
            }
            return Some(entry.due);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap
            .iter()
            .filter(|e| !self.cancelled.contains(&e.id))
            .map(|e| &e.payload)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.cancelled.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
