use symbology::ResourceId;

use crate::request::SubscriberId;
use crate::state::LoadState;

/// Delivered once per watch, when the watched resource settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadNotification {
    pub subscriber: SubscriberId,
    pub id: ResourceId,
    pub state: LoadState,
}

/// Notifications produced during a pump, in emission order.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<LoadNotification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, subscriber: SubscriberId, id: ResourceId, state: LoadState) {
        self.pending.push(LoadNotification {
            subscriber,
            id,
            state,
        });
    }

    pub fn notifications(&self) -> &[LoadNotification] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<LoadNotification> {
        std::mem::take(&mut self.pending)
    }
}
