//! Search filters over vector ids.
//!
//! Filters restrict which stored vectors a search may return. They are
//! consulted twice: while gathering approximate candidates, and again on
//! the exact result set before it is handed back.

use basalt_core::Range;

/// A predicate over vector ids.
pub trait FilterFunctor: Send + Sync {
    fn check(&self, vector_id: u64) -> bool;
}

/// Accepts only the ids in an owned, sorted list.
pub struct ListFilterFunctor {
    ids: Vec<u64>,
}

impl ListFilterFunctor {
    /// Takes any id list; it is sorted and deduplicated here.
    pub fn new(mut ids: Vec<u64>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        ListFilterFunctor { ids }
    }
}

impl FilterFunctor for ListFilterFunctor {
    fn check(&self, vector_id: u64) -> bool {
        self.ids.binary_search(&vector_id).is_ok()
    }
}

/// Accepts ids inside a region's decoded id window `[min, max)`.
pub struct RangeFilterFunctor {
    min_vector_id: u64,
    max_vector_id: u64,
}

impl RangeFilterFunctor {
    pub fn new(min_vector_id: u64, max_vector_id: u64) -> Self {
        RangeFilterFunctor {
            min_vector_id,
            max_vector_id,
        }
    }

    /// Build from a region raw range whose keys embed vector ids; an end
    /// key that decodes to 0 means unbounded above.
    pub fn from_key_range(range: &Range) -> Self {
        let min = basalt_core::codec::decode_vector_id(&range.start_key);
        let mut max = basalt_core::codec::decode_vector_id(&range.end_key);
        if max == 0 {
            max = u64::MAX;
        }
        RangeFilterFunctor::new(min, max)
    }
}

impl FilterFunctor for RangeFilterFunctor {
    fn check(&self, vector_id: u64) -> bool {
        vector_id >= self.min_vector_id && vector_id < self.max_vector_id
    }
}

/// True iff every filter accepts the id; an empty slice accepts all.
pub fn passes_filters(filters: &[std::sync::Arc<dyn FilterFunctor>], vector_id: u64) -> bool {
    filters.iter().all(|f| f.check(vector_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_list_filter() {
        let filter = ListFilterFunctor::new(vec![5, 1, 3, 3]);
        assert!(filter.check(1));
        assert!(filter.check(3));
        assert!(filter.check(5));
        assert!(!filter.check(2));
        assert!(!filter.check(0));
    }

    #[test]
    fn test_range_filter_half_open() {
        let filter = RangeFilterFunctor::new(10, 20);
        assert!(filter.check(10));
        assert!(filter.check(19));
        assert!(!filter.check(20));
        assert!(!filter.check(9));
    }

    #[test]
    fn test_range_filter_from_key_range_unbounded_end() {
        let range = Range::new(basalt_core::codec::encode_vector_key(b"v", 100), b"w".to_vec());
        let filter = RangeFilterFunctor::from_key_range(&range);
        assert!(!filter.check(99));
        assert!(filter.check(100));
        assert!(filter.check(u64::MAX - 1));
    }

    #[test]
    fn test_passes_filters_conjunction() {
        let filters: Vec<Arc<dyn FilterFunctor>> = vec![
            Arc::new(ListFilterFunctor::new(vec![1, 2, 3])),
            Arc::new(RangeFilterFunctor::new(2, 10)),
        ];
        assert!(passes_filters(&filters, 2));
        assert!(passes_filters(&filters, 3));
        assert!(!passes_filters(&filters, 1));
        assert!(!passes_filters(&filters, 4));
        assert!(passes_filters(&[], 42));
    }
}
