use std::collections::{BTreeMap, BTreeSet};

use resources::{CacheError, LoadState, ResourceCache, ResourceFetcher, SubscriberId};
use symbology::{
    DimensionDefaults, Geometry, KeyError, ResourceDescriptor, ResourceId, ResourceKeyBuilder,
    Symbol, collect_geometry,
};
use tracing::debug;

use crate::config::{ConfigError, RendererConfig};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeometryId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What a frame needs before it can draw at full fidelity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramePlan {
    pub frame_index: u64,
    /// Geometries whose resources were collected again for this frame.
    pub recollected: usize,
    /// Resources still loading, in identity order.
    pub waiting: Vec<ResourceId>,
    /// Resources that failed; drawn without, never waited on.
    pub unavailable: Vec<ResourceId>,
}

impl FramePlan {
    pub fn is_ready(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[derive(Debug)]
struct Tracked {
    geometry: Geometry,
    visible: bool,
    dirty: bool,
    descriptors: Vec<ResourceDescriptor>,
}

/// Keeps the resources of a renderer's geometries discovered and loaded
/// across frames.
///
/// Anything that can change what a symbol resolves to marks geometries dirty;
/// `prepare_frame` collects again for dirty visible geometries only.
#[derive(Debug)]
pub struct RenderCycle {
    config: RendererConfig,
    keys: ResourceKeyBuilder,
    defaults: DimensionDefaults,
    cache: ResourceCache,
    geometries: BTreeMap<GeometryId, Tracked>,
    next_id: u64,
    zoom: Option<f64>,
    subscriber: SubscriberId,
    watched: BTreeSet<ResourceId>,
    waiting: BTreeSet<ResourceId>,
    redraw: bool,
    frame_index: u64,
}

impl RenderCycle {
    pub fn new(config: RendererConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            keys: config.key_builder()?,
            defaults: config.dimension_defaults(),
            config,
            cache: ResourceCache::new(),
            geometries: BTreeMap::new(),
            next_id: 0,
            zoom: None,
            subscriber: SubscriberId(0),
            watched: BTreeSet::new(),
            waiting: BTreeSet::new(),
            redraw: false,
            frame_index: 0,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Direct cache access for hosts that fetch asynchronously and settle
    /// loads themselves. Call [`RenderCycle::poll_notifications`] afterwards.
    pub fn cache_mut(&mut self) -> &mut ResourceCache {
        &mut self.cache
    }

    pub fn zoom(&self) -> Option<f64> {
        self.zoom
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        let id = GeometryId(self.next_id);
        self.next_id += 1;
        self.geometries.insert(
            id,
            Tracked {
                geometry,
                visible: true,
                dirty: true,
                descriptors: Vec::new(),
            },
        );
        id
    }

    pub fn remove_geometry(&mut self, id: GeometryId) -> Option<Geometry> {
        self.geometries.remove(&id).map(|t| t.geometry)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(&id).map(|t| &t.geometry)
    }

    /// Descriptors from the last collection of `id`.
    pub fn descriptors(&self, id: GeometryId) -> Option<&[ResourceDescriptor]> {
        self.geometries.get(&id).map(|t| t.descriptors.as_slice())
    }

    pub fn set_symbol(&mut self, id: GeometryId, symbol: Symbol) -> bool {
        self.modify(id, |g| g.set_symbol(symbol))
    }

    pub fn update_symbol(&mut self, id: GeometryId, patch: &Symbol) -> bool {
        self.modify(id, |g| g.update_symbol(patch))
    }

    pub fn set_feature_properties(
        &mut self,
        id: GeometryId,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> bool {
        self.modify(id, |g| g.set_properties(properties))
    }

    pub fn set_visible(&mut self, id: GeometryId, visible: bool) -> bool {
        match self.geometries.get_mut(&id) {
            Some(tracked) => {
                tracked.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Camera change. Zoom-driven expressions may now select other stops, so
    /// every geometry is collected again.
    pub fn set_zoom(&mut self, zoom: f64) {
        if self.zoom == Some(zoom) {
            return;
        }
        self.zoom = Some(zoom);
        for tracked in self.geometries.values_mut() {
            tracked.dirty = true;
        }
    }

    fn modify(&mut self, id: GeometryId, f: impl FnOnce(&mut Geometry)) -> bool {
        let Some(tracked) = self.geometries.get_mut(&id) else {
            return false;
        };
        f(&mut tracked.geometry);
        tracked.dirty = true;
        true
    }

    /// Collects dirty visible geometries, makes sure every needed resource is
    /// known to the cache and reports what the frame still waits on.
    ///
    /// A geometry whose collection fails stays dirty.
    pub fn prepare_frame(&mut self) -> Result<FramePlan, RenderError> {
        let mut recollected = 0;
        for (id, tracked) in self.geometries.iter_mut() {
            if !(tracked.visible && tracked.dirty) {
                continue;
            }
            tracked.descriptors =
                collect_geometry(&tracked.geometry, self.zoom, self.defaults, &self.keys)?;
            tracked.dirty = false;
            recollected += 1;
            debug!(
                geometry = id.0,
                resources = tracked.descriptors.len(),
                "collected symbol resources"
            );
        }

        let mut waiting = BTreeSet::new();
        let mut unavailable = BTreeSet::new();
        for tracked in self.geometries.values().filter(|t| t.visible) {
            for descriptor in &tracked.descriptors {
                let handle = self.cache.ensure(descriptor);
                match self.cache.state(&handle.id) {
                    Some(LoadState::Pending) => {
                        if self.watched.insert(handle.id.clone()) {
                            self.cache.watch(&handle, self.subscriber)?;
                        }
                        waiting.insert(handle.id);
                    }
                    Some(LoadState::Failed) => {
                        unavailable.insert(handle.id);
                    }
                    Some(LoadState::Loaded) | None => {}
                }
            }
        }

        let plan = FramePlan {
            frame_index: self.frame_index,
            recollected,
            waiting: waiting.iter().cloned().collect(),
            unavailable: unavailable.into_iter().collect(),
        };
        self.frame_index += 1;
        self.waiting = waiting;
        self.redraw = false;
        Ok(plan)
    }

    /// Runs queued loads through `fetcher` within the configured per-frame
    /// budget, then processes the resulting notifications.
    pub fn pump<F: ResourceFetcher + ?Sized>(&mut self, fetcher: &mut F) -> usize {
        let mut budget = self.config.load_budget();
        let settled = self.cache.pump(fetcher, &mut budget);
        self.poll_notifications();
        settled
    }

    /// Consumes cache notifications for this renderer. Returns how many
    /// waited-on resources settled.
    pub fn poll_notifications(&mut self) -> usize {
        let mut settled = 0;
        for notification in self.cache.drain_notifications() {
            if notification.subscriber != self.subscriber {
                continue;
            }
            self.watched.remove(&notification.id);
            if self.waiting.remove(&notification.id) {
                settled += 1;
            }
        }
        if settled > 0 && self.waiting.is_empty() {
            self.redraw = true;
        }
        settled
    }

    /// `true` once per transition to "everything the last plan waited on has
    /// settled".
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    /// Drops a settled resource so the next frame loads it again.
    pub fn invalidate(&mut self, id: &ResourceId) -> bool {
        if !self.cache.invalidate(id) {
            return false;
        }
        self.watched.remove(id);
        true
    }
}
