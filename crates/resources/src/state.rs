use serde::Serialize;

/// Load lifecycle of a cached resource.
///
/// `Pending → Loaded | Failed`. Settled entries only change through explicit
/// invalidation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Pending,
    Loaded,
    Failed,
}

impl LoadState {
    pub fn is_settled(self) -> bool {
        !matches!(self, LoadState::Pending)
    }
}
