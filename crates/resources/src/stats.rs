use serde::Serialize;

/// Counters describing cache activity. Plain integers so snapshots compare
/// exactly in tests and logs.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// `ensure` calls.
    pub requests: u64,
    /// `ensure` calls answered by an existing entry.
    pub hits: u64,
    /// Loads handed to a fetcher or the host, plus loads the host settled
    /// before they were handed out.
    pub fetches: u64,
    pub loaded: u64,
    pub failed: u64,
}

impl CacheStats {
    pub fn misses(&self) -> u64 {
        self.requests.saturating_sub(self.hits)
    }
}
