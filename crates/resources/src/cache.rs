use std::collections::BTreeMap;

use symbology::{ResourceDescriptor, ResourceId};
use tracing::{debug, warn};

use crate::fetch::{FetchError, FetchedAsset, ResourceFetcher, sniff_natural_size};
use crate::notify::{LoadNotification, Outbox};
use crate::queue::{LoadBudget, LoadQueue};
use crate::request::{LoadHandle, LoadRequest, SubscriberId};
use crate::state::LoadState;
use crate::stats::CacheStats;

/// A decoded resource ready for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Pixel size read from the asset itself, if recognizable.
    pub natural_size: Option<(u32, u32)>,
    /// Size to draw at: declared by the descriptor, else natural.
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),
    #[error("unknown or already settled load request {0:?}")]
    UnknownRequest(LoadRequest),
}

#[derive(Debug)]
struct CacheEntry {
    request: LoadRequest,
    state: LoadState,
    declared: (Option<f64>, Option<f64>),
    asset: Option<LoadedAsset>,
    error: Option<FetchError>,
    watchers: Vec<SubscriberId>,
}

/// Per-renderer table of external resources and their load state.
///
/// Single-threaded and host-driven: `ensure` only queues work, the host
/// starts loads with [`ResourceCache::next_load`] (or [`ResourceCache::pump`])
/// and settles them with [`ResourceCache::complete`]. Entries are keyed in a
/// `BTreeMap` so traversal order is stable.
#[derive(Debug, Default)]
pub struct ResourceCache {
    next_request: u64,
    entries: BTreeMap<ResourceId, CacheEntry>,
    in_flight: BTreeMap<LoadRequest, ResourceId>,
    queue: LoadQueue,
    outbox: Outbox,
    stats: CacheStats,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Loads queued but not yet handed out.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns the handle for `descriptor`, queueing a load on first sight.
    pub fn ensure(&mut self, descriptor: &ResourceDescriptor) -> LoadHandle {
        self.ensure_with_priority(descriptor, 0)
    }

    pub fn ensure_with_priority(
        &mut self,
        descriptor: &ResourceDescriptor,
        priority: i32,
    ) -> LoadHandle {
        self.stats.requests += 1;
        if let Some(entry) = self.entries.get(&descriptor.id) {
            self.stats.hits += 1;
            return LoadHandle {
                request: entry.request,
                id: descriptor.id.clone(),
            };
        }

        let request = LoadRequest(self.next_request);
        self.next_request += 1;
        self.entries.insert(
            descriptor.id.clone(),
            CacheEntry {
                request,
                state: LoadState::Pending,
                declared: (descriptor.width, descriptor.height),
                asset: None,
                error: None,
                watchers: Vec::new(),
            },
        );
        self.in_flight.insert(request, descriptor.id.clone());
        self.queue.push(priority, request);
        debug!(request = request.0, id = %short(&descriptor.id), "resource queued");

        LoadHandle {
            request,
            id: descriptor.id.clone(),
        }
    }

    pub fn state(&self, id: &ResourceId) -> Option<LoadState> {
        self.entries.get(id).map(|e| e.state)
    }

    pub fn is_loaded(&self, descriptor: &ResourceDescriptor) -> bool {
        self.state(&descriptor.id) == Some(LoadState::Loaded)
    }

    pub fn asset(&self, id: &ResourceId) -> Option<&LoadedAsset> {
        self.entries.get(id).and_then(|e| e.asset.as_ref())
    }

    pub fn error(&self, id: &ResourceId) -> Option<&FetchError> {
        self.entries.get(id).and_then(|e| e.error.as_ref())
    }

    /// Registers `subscriber` for one notification when `handle` settles.
    ///
    /// An already settled resource notifies immediately.
    pub fn watch(
        &mut self,
        handle: &LoadHandle,
        subscriber: SubscriberId,
    ) -> Result<(), CacheError> {
        let entry = self
            .entries
            .get_mut(&handle.id)
            .ok_or_else(|| CacheError::UnknownResource(handle.id.clone()))?;
        if entry.state.is_settled() {
            self.outbox.emit(subscriber, handle.id.clone(), entry.state);
        } else {
            entry.watchers.push(subscriber);
        }
        Ok(())
    }

    /// Hands the next queued load to the host, if the budget allows.
    pub fn next_load(&mut self, budget: &mut LoadBudget) -> Option<(LoadRequest, ResourceId)> {
        let request = self.queue.pop_next_with_budget(budget)?;
        let id = self.in_flight.get(&request)?.clone();
        self.stats.fetches += 1;
        debug!(request = request.0, id = %short(&id), "resource load started");
        Some((request, id))
    }

    /// Settles an in-flight load and notifies its watchers in order.
    pub fn complete(
        &mut self,
        request: LoadRequest,
        result: Result<FetchedAsset, FetchError>,
    ) -> Result<LoadState, CacheError> {
        let id = self
            .in_flight
            .remove(&request)
            .ok_or(CacheError::UnknownRequest(request))?;
        // Settled before `next_load` handed it out: the host fetched it on its
        // own, which still counts as a fetch.
        if self.queue.remove(request) {
            self.stats.fetches += 1;
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| CacheError::UnknownResource(id.clone()))?;

        match result {
            Ok(fetched) => {
                let natural_size = sniff_natural_size(&fetched.bytes);
                let (declared_w, declared_h) = entry.declared;
                entry.asset = Some(LoadedAsset {
                    width: declared_w.or(natural_size.map(|(w, _)| f64::from(w))),
                    height: declared_h.or(natural_size.map(|(_, h)| f64::from(h))),
                    natural_size,
                    bytes: fetched.bytes,
                    content_type: fetched.content_type,
                });
                entry.state = LoadState::Loaded;
                self.stats.loaded += 1;
                debug!(request = request.0, id = %short(&id), "resource loaded");
            }
            Err(err) => {
                warn!(request = request.0, id = %short(&id), "resource failed to load: {err}");
                entry.error = Some(err);
                entry.state = LoadState::Failed;
                self.stats.failed += 1;
            }
        }

        let state = entry.state;
        for subscriber in std::mem::take(&mut entry.watchers) {
            self.outbox.emit(subscriber, id.clone(), state);
        }
        Ok(state)
    }

    /// Starts and completes queued loads through `fetcher` until the queue or
    /// the budget runs out. Returns the number of loads settled.
    pub fn pump<F: ResourceFetcher + ?Sized>(
        &mut self,
        fetcher: &mut F,
        budget: &mut LoadBudget,
    ) -> usize {
        let mut settled = 0;
        while let Some((request, id)) = self.next_load(budget) {
            let result = fetcher.fetch(&id);
            match self.complete(request, result) {
                Ok(_) => settled += 1,
                Err(err) => warn!("dropping completion: {err}"),
            }
        }
        settled
    }

    pub fn drain_notifications(&mut self) -> Vec<LoadNotification> {
        self.outbox.drain()
    }

    /// Forgets a settled entry so the next `ensure` loads it again.
    ///
    /// Pending entries are left alone; returns whether anything was removed.
    pub fn invalidate(&mut self, id: &ResourceId) -> bool {
        match self.entries.get(id) {
            Some(entry) if entry.state.is_settled() => {
                self.entries.remove(id);
                debug!(id = %short(id), "resource invalidated");
                true
            }
            _ => false,
        }
    }

    /// Drops every entry. Outstanding requests become unknown.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_flight.clear();
        self.queue = LoadQueue::new();
        self.outbox.drain();
    }
}

/// Data-URIs can be kilobytes long; keep log lines readable.
fn short(id: &ResourceId) -> &str {
    let s = id.as_str();
    match s.char_indices().nth(64) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheError, ResourceCache};
    use crate::fetch::{FetchError, FetchedAsset, MemoryFetcher};
    use crate::queue::LoadBudget;
    use crate::request::SubscriberId;
    use crate::state::LoadState;
    use pretty_assertions::assert_eq;
    use symbology::{ResourceDescriptor, ResourceId};

    fn descriptor(id: &str, w: Option<f64>, h: Option<f64>) -> ResourceDescriptor {
        ResourceDescriptor::new(ResourceId::new(id), w, h)
    }

    fn svg(w: u32, h: u32) -> FetchedAsset {
        FetchedAsset::new(
            format!(r#"<svg width="{w}" height="{h}"></svg>"#),
            Some("image/svg+xml"),
        )
    }

    #[test]
    fn concurrent_ensures_share_one_fetch() {
        let mut cache = ResourceCache::new();
        let mut fetcher = MemoryFetcher::new();
        let d = descriptor("http://host/x.svg", Some(20.0), Some(30.0));
        fetcher.insert(d.id.clone(), svg(10, 10));

        let a = cache.ensure(&d);
        let b = cache.ensure(&d);
        assert_eq!(a, b);
        assert_eq!(cache.queued(), 1);

        cache.pump(&mut fetcher, &mut LoadBudget::unlimited());
        assert_eq!(fetcher.fetch_count(&d.id), 1);
        assert!(cache.is_loaded(&d));

        let stats = cache.stats();
        assert_eq!((stats.requests, stats.hits, stats.fetches), (2, 1, 1));
    }

    #[test]
    fn watchers_are_notified_once_in_registration_order() {
        let mut cache = ResourceCache::new();
        let d = descriptor("http://host/x.svg", None, None);
        let handle = cache.ensure(&d);
        cache.watch(&handle, SubscriberId(7)).unwrap();
        let again = cache.ensure(&d);
        cache.watch(&again, SubscriberId(3)).unwrap();

        let (request, id) = cache.next_load(&mut LoadBudget::unlimited()).unwrap();
        assert_eq!(id, d.id);
        assert!(cache.drain_notifications().is_empty());

        assert_eq!(cache.complete(request, Ok(svg(4, 5))), Ok(LoadState::Loaded));
        let order: Vec<SubscriberId> = cache
            .drain_notifications()
            .into_iter()
            .map(|n| n.subscriber)
            .collect();
        assert_eq!(order, vec![SubscriberId(7), SubscriberId(3)]);

        // Settled: a late watcher hears back at once, early ones not again.
        cache.watch(&handle, SubscriberId(9)).unwrap();
        let late = cache.drain_notifications();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].subscriber, SubscriberId(9));
    }

    #[test]
    fn failures_are_sticky_until_invalidated() {
        let mut cache = ResourceCache::new();
        let mut fetcher = MemoryFetcher::new();
        let d = descriptor("http://host/missing.svg", Some(20.0), Some(30.0));

        cache.ensure(&d);
        cache.pump(&mut fetcher, &mut LoadBudget::unlimited());
        assert_eq!(cache.state(&d.id), Some(LoadState::Failed));
        assert!(matches!(cache.error(&d.id), Some(FetchError::NotFound(_))));

        cache.ensure(&d);
        cache.pump(&mut fetcher, &mut LoadBudget::unlimited());
        assert_eq!(fetcher.fetch_count(&d.id), 1);

        assert!(cache.invalidate(&d.id));
        fetcher.insert(d.id.clone(), svg(1, 1));
        cache.ensure(&d);
        cache.pump(&mut fetcher, &mut LoadBudget::unlimited());
        assert_eq!(fetcher.fetch_count(&d.id), 2);
        assert!(cache.is_loaded(&d));
    }

    #[test]
    fn pending_entries_cannot_be_invalidated() {
        let mut cache = ResourceCache::new();
        let d = descriptor("http://host/x.svg", None, None);
        cache.ensure(&d);
        assert!(!cache.invalidate(&d.id));
        assert_eq!(cache.state(&d.id), Some(LoadState::Pending));
    }

    #[test]
    fn natural_size_fills_undeclared_dimensions() {
        let mut cache = ResourceCache::new();
        let mut fetcher = MemoryFetcher::new();
        let d = descriptor("http://host/x.svg", Some(20.0), None);
        fetcher.insert(d.id.clone(), svg(40, 60));

        cache.ensure(&d);
        cache.pump(&mut fetcher, &mut LoadBudget::unlimited());
        let asset = cache.asset(&d.id).unwrap();
        assert_eq!(asset.natural_size, Some((40, 60)));
        assert_eq!((asset.width, asset.height), (Some(20.0), Some(60.0)));
    }

    #[test]
    fn pump_respects_budget() {
        let mut cache = ResourceCache::new();
        let mut fetcher = MemoryFetcher::new();
        for name in ["a", "b", "c"] {
            cache.ensure(&descriptor(&format!("http://host/{name}.svg"), None, None));
        }
        assert_eq!(cache.pump(&mut fetcher, &mut LoadBudget::new(2)), 2);
        assert_eq!(cache.queued(), 1);
        assert_eq!(cache.pump(&mut fetcher, &mut LoadBudget::new(2)), 1);
    }

    #[test]
    fn completing_a_queued_load_counts_as_a_fetch() {
        let mut cache = ResourceCache::new();
        let d = descriptor("http://host/x.svg", None, None);
        let handle = cache.ensure(&d);
        cache.watch(&handle, SubscriberId(1)).unwrap();
        assert_eq!(cache.queued(), 1);

        assert_eq!(cache.complete(handle.request, Ok(svg(2, 3))), Ok(LoadState::Loaded));
        assert_eq!(cache.queued(), 0);
        assert!(cache.next_load(&mut LoadBudget::unlimited()).is_none());
        assert_eq!(cache.drain_notifications().len(), 1);

        let stats = cache.stats();
        assert_eq!((stats.fetches, stats.loaded), (1, 1));
    }

    #[test]
    fn unknown_and_repeated_completions_are_rejected() {
        let mut cache = ResourceCache::new();
        let d = descriptor("http://host/x.svg", None, None);
        let handle = cache.ensure(&d);
        assert!(cache.complete(handle.request, Ok(svg(1, 1))).is_ok());
        assert_eq!(
            cache.complete(handle.request, Ok(svg(1, 1))),
            Err(CacheError::UnknownRequest(handle.request))
        );
        assert_eq!(cache.queued(), 0);
    }
}
