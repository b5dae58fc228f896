//! Process-wide region registry.
//!
//! One registry per node, keyed by region id. Foreground request paths hold
//! strong `Arc<Region>` handles for the duration of a request; background
//! tasks (snapshot save, index rebuild) keep `Weak<Region>` and upgrade
//! before use, silently dropping the work if the region has been removed.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::region::Region;

#[derive(Default)]
pub struct RegionRegistry {
    regions: DashMap<u64, Arc<Region>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        RegionRegistry {
            regions: DashMap::new(),
        }
    }

    pub fn insert(&self, region: Arc<Region>) {
        self.regions.insert(region.id(), region);
    }

    pub fn get(&self, region_id: u64) -> Option<Arc<Region>> {
        self.regions.get(&region_id).map(|r| Arc::clone(&r))
    }

    /// Handle for background tasks; upgrade may fail once the region is
    /// removed from the registry and all strong handles are gone.
    pub fn weak(&self, region_id: u64) -> Option<Weak<Region>> {
        self.regions.get(&region_id).map(|r| Arc::downgrade(&r))
    }

    pub fn remove(&self, region_id: u64) -> Option<Arc<Region>> {
        self.regions.remove(&region_id).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn all(&self) -> Vec<Arc<Region>> {
        self.regions.iter().map(|r| Arc::clone(&r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;
    use crate::region::{RegionEpoch, RegionType};

    fn new_region(id: u64) -> Arc<Region> {
        Arc::new(Region::new(
            id,
            RegionType::Store,
            RegionEpoch::new(1, 1),
            Range::new(vec![id as u8], vec![id as u8 + 1]),
            vec![],
        ))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = RegionRegistry::new();
        registry.insert(new_region(1));
        registry.insert(new_region(2));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).unwrap().id(), 1);
        assert!(registry.get(3).is_none());
        assert!(registry.remove(1).is_some());
        assert!(registry.get(1).is_none());
    }

    #[test]
    fn test_weak_handle_drops_with_region() {
        let registry = RegionRegistry::new();
        registry.insert(new_region(7));
        let weak = registry.weak(7).unwrap();
        assert!(weak.upgrade().is_some());

        registry.remove(7);
        // The registry held the only strong reference.
        assert!(weak.upgrade().is_none());
    }
}
