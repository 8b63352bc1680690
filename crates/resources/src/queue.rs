use crate::request::LoadRequest;

/// Number of loads that may start during one turn of the host loop.
///
/// Counted in whole loads rather than time so pumping stays deterministic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoadBudget {
    remaining: u32,
}

impl LoadBudget {
    pub fn new(loads: u32) -> Self {
        Self { remaining: loads }
    }

    pub fn unlimited() -> Self {
        Self {
            remaining: u32::MAX,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Returns `true` and spends one load if any are left.
    pub fn try_start(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Item {
    // Smaller values load earlier.
    priority: i32,
    seq: u64,
    request: LoadRequest,
}

/// Loads waiting to start, ordered by `(priority, submission order)`.
///
/// Vec-backed: the queue only ever holds loads for distinct identities, so it
/// stays small.
#[derive(Debug, Default)]
pub struct LoadQueue {
    next_seq: u64,
    items: Vec<Item>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, priority: i32, request: LoadRequest) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.items.push(Item {
            priority,
            seq,
            request,
        });
    }

    pub fn remove(&mut self, request: LoadRequest) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.request != request);
        self.items.len() != before
    }

    /// Pops the next load if the budget allows starting it.
    pub fn pop_next_with_budget(&mut self, budget: &mut LoadBudget) -> Option<LoadRequest> {
        let idx = self
            .items
            .iter()
            .enumerate()
            .min_by_key(|(_, i)| (i.priority, i.seq))
            .map(|(idx, _)| idx)?;
        if !budget.try_start() {
            return None;
        }
        Some(self.items.remove(idx).request)
    }
}
