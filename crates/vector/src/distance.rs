//! Distance kernels shared by all index variants.
//!
//! Reported distances follow each metric's native convention: squared L2
//! distance (0 for identical vectors), `1 - dot` for inner product, raw
//! cosine similarity of normalized vectors (~1 for identical). Internally
//! every variant ranks candidates by [`rank_score`], where higher always
//! means closer, with ascending id as the tie-break.

use crate::types::MetricType;

pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale to unit L2 norm; the zero vector is left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// The reported distance between a query and a stored vector.
///
/// Cosine assumes both sides were normalized on the way in.
pub fn distance(metric: MetricType, query: &[f32], stored: &[f32]) -> f32 {
    match metric {
        MetricType::L2 => l2_squared(query, stored),
        MetricType::InnerProduct => 1.0 - inner_product(query, stored),
        MetricType::Cosine => inner_product(query, stored),
    }
}

/// Ranking form of a reported distance: higher is closer for every
/// metric.
pub fn rank_score(metric: MetricType, distance: f32) -> f32 {
    match metric {
        MetricType::L2 | MetricType::InnerProduct => -distance,
        MetricType::Cosine => distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_identical_is_zero() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(l2_squared(&v, &v), 0.0);
        assert_eq!(distance(MetricType::L2, &v, &v), 0.0);
    }

    #[test]
    fn test_l2_is_squared() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }

    #[test]
    fn test_ip_unit_vector_distance_zero() {
        let v = [1.0, 0.0];
        assert!((distance(MetricType::InnerProduct, &v, &v)).abs() < 1e-6);
        // Orthogonal unit vectors are at distance 1.
        assert!((distance(MetricType::InnerProduct, &[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_identical_normalized_near_one() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let d = distance(MetricType::Cosine, &v, &v);
        assert!(d >= 1.0 - 1e-5);
    }

    #[test]
    fn test_normalize_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rank_score_orders_toward_closer() {
        // L2: smaller distance ranks higher.
        assert!(rank_score(MetricType::L2, 0.5) > rank_score(MetricType::L2, 2.0));
        // IP: smaller reported distance (larger dot) ranks higher.
        assert!(
            rank_score(MetricType::InnerProduct, 0.1) > rank_score(MetricType::InnerProduct, 0.9)
        );
        // Cosine: larger similarity ranks higher.
        assert!(rank_score(MetricType::Cosine, 0.9) > rank_score(MetricType::Cosine, 0.1));
    }
}
