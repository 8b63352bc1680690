use symbology::ResourceId;

/// Identifies one underlying load. Copyable so it can sit in the load queue
/// without cloning the identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadRequest(pub u64);

/// Returned by `ResourceCache::ensure`. Every caller asking for the same
/// identity gets an equal handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadHandle {
    pub request: LoadRequest,
    pub id: ResourceId,
}

/// A party interested in load completion.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u64);
