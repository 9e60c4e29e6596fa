//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Return the euclidian norm (distance between) of two points.
///
/// If the points do not have the same number of dimentions then `None` is
/// returned.
pub fn norm<T>(point_0: &[T], point_1: &[T]) -> Option<T>
where
    T: Float + std::ops::AddAssign
{
    // Check that the dimentions match
    if point_0.len() != point_1.len() {
        return None;
    }

    let mut sum = T::zero();

    for (a, b) in point_0.iter().zip(point_1.iter()) {
        sum += (*a - *b).powi(2);
    }

    Some(sum.sqrt())
}

/// Round a value to the given number of decimal places.
pub fn round_dp<T>(value: T, decimal_places: i32) -> T
where
    T: Float
{
    let scale = T::from(10).unwrap_or_else(T::one).powi(decimal_places);

    (value * scale).round() / scale
}

/// Limit a value to be within `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float
{
    value.max(min).min(max)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 180f64), (2.5f64, 12.5f64), 0.0), 2.5);
        assert_eq!(lin_map((0f64, 180f64), (2.5f64, 12.5f64), 90.0), 7.5);
        assert_eq!(lin_map((0f64, 180f64), (2.5f64, 12.5f64), 180.0), 12.5);
    }

    #[test]
    fn test_norm() {
        assert_eq!(norm(&[0f64, 0f64], &[3f64, 4f64]), Some(5f64));
        assert_eq!(norm(&[0f64, 0f64], &[3f64]), None);
    }

    #[test]
    fn test_round_dp() {
        assert_eq!(round_dp(150.0199f64, 2), 150.02);
        assert_eq!(round_dp(-1.005f64, 1), -1.0);
        assert_eq!(round_dp(7.0f64, 2), 7.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5f64, 0f64, 1f64), 1f64);
        assert_eq!(clamp(-5f64, 0f64, 1f64), 0f64);
        assert_eq!(clamp(0.5f64, 0f64, 1f64), 0.5f64);
    }
}
