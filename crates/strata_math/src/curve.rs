//! Curve evaluation helpers shared by [`crate::spline::Spline`]
//!
//! Catmull-Rom and cubic Bezier segments take four points; NURBS take the
//! full control net with weights, a knot vector and the basis order.

use crate::error::{SplineError, SplineResult};
use crate::vector::Vec3;

/// Smallest spacing forced between repeated knots
pub const KNOTS_MINIMUM_DELTA: f32 = 0.0001;

/// Subdivision stops once a chord is within this of its two half chords
const CATMULL_ROM_LENGTH_EPSILON: f32 = 0.001;

/// Recursion cap for adaptive Catmull-Rom length
const CATMULL_ROM_MAX_DEPTH: u32 = 16;

/// Parameter step for sampled Bezier length
const BEZIER_LENGTH_STEPS: u32 = 50;

/// Catmull-Rom interpolation between `p1` and `p2`
///
/// `tension` of 0.5 gives the uniform Catmull-Rom curve;
/// `p0` and `p3` only shape the tangents.
pub fn interpolate_catmull_rom(u: f32, tension: f32, p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> Vec3 {
    let t = tension;
    let c1 = p1;
    let c2 = p0 * -t + p2 * t;
    let c3 = p0 * (2.0 * t) + p1 * (t - 3.0) + p2 * (3.0 - 2.0 * t) + p3 * -t;
    let c4 = p0 * -t + p1 * (2.0 - t) + p2 * (t - 2.0) + p3 * t;

    ((c4 * u + c3) * u + c2) * u + c1
}

/// Cubic Bezier interpolation; `p0` and `p3` are the anchors
pub fn interpolate_bezier(u: f32, p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> Vec3 {
    let one_minus_u = 1.0 - u;
    let one_minus_u2 = one_minus_u * one_minus_u;
    let u2 = u * u;

    p0 * (one_minus_u2 * one_minus_u)
        + p1 * (3.0 * u * one_minus_u2)
        + p2 * (3.0 * u2 * one_minus_u)
        + p3 * (u2 * u)
}

/// Arc length of a Catmull-Rom segment between parameters `start` and `end`
///
/// Halves the range until the chord and the two half chords agree.
pub fn catmull_rom_length(
    p0: Vec3,
    p1: Vec3,
    p2: Vec3,
    p3: Vec3,
    start: f32,
    end: f32,
    tension: f32,
) -> f32 {
    catmull_rom_length_at_depth(p0, p1, p2, p3, start, end, tension, 0)
}

#[allow(clippy::too_many_arguments)]
fn catmull_rom_length_at_depth(
    p0: Vec3,
    p1: Vec3,
    p2: Vec3,
    p3: Vec3,
    start: f32,
    end: f32,
    tension: f32,
    depth: u32,
) -> f32 {
    let middle_value = (start + end) * 0.5;
    let start_point = if start != 0.0 {
        interpolate_catmull_rom(start, tension, p0, p1, p2, p3)
    } else {
        p1
    };
    let end_point = if end != 1.0 {
        interpolate_catmull_rom(end, tension, p0, p1, p2, p3)
    } else {
        p2
    };
    let middle = interpolate_catmull_rom(middle_value, tension, p0, p1, p2, p3);

    let chord = (end_point - start_point).length();
    let mut l1 = (middle - start_point).length();
    let mut l2 = (end_point - middle).length();

    if chord + CATMULL_ROM_LENGTH_EPSILON < l1 + l2 && depth < CATMULL_ROM_MAX_DEPTH {
        l1 = catmull_rom_length_at_depth(p0, p1, p2, p3, start, middle_value, tension, depth + 1);
        l2 = catmull_rom_length_at_depth(p0, p1, p2, p3, middle_value, end, tension, depth + 1);
    }
    l1 + l2
}

/// Arc length of a cubic Bezier segment, sampled at a fixed step of 0.02
pub fn bezier_length(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> f32 {
    let mut previous = p0;
    let mut result = 0.0;
    for step in 0..=BEZIER_LENGTH_STEPS {
        let u = step as f32 / BEZIER_LENGTH_STEPS as f32;
        let point = interpolate_bezier(u, p0, p1, p2, p3);
        result += (previous - point).length();
        previous = point;
    }
    result
}

/// Check that `knots` never decreases
pub fn validate_knots(knots: &[f32]) -> SplineResult<()> {
    match knots.windows(2).position(|w| w[0] > w[1]) {
        Some(index) => Err(SplineError::DecreasingKnots { index: index + 1 }),
        None => Ok(()),
    }
}

/// Spread repeated knots apart so no basis denominator is zero
///
/// Each knot that does not exceed its predecessor is pushed up by a delta
/// that grows by [`KNOTS_MINIMUM_DELTA`] for every consecutive repeat.
pub fn prepare_nurbs_knots(knots: &mut [f32]) {
    let Some(&first) = knots.first() else {
        return;
    };
    let mut delta = KNOTS_MINIMUM_DELTA;
    let mut previous = first;
    for knot in knots.iter_mut().skip(1) {
        if *knot <= previous {
            *knot += delta;
            delta += KNOTS_MINIMUM_DELTA;
        } else {
            delta = KNOTS_MINIMUM_DELTA;
        }
        previous = *knot;
    }
}

/// Cox-de Boor basis function `N(i, order)` at parameter `t`
pub fn nurbs_basis(i: usize, order: usize, t: f32, knots: &[f32]) -> SplineResult<f32> {
    if i + order.max(1) >= knots.len() {
        return Err(SplineError::InvalidKnotCount {
            knots: knots.len(),
            weights: i + 1,
        });
    }
    if order <= 1 {
        return Ok(if knots[i] <= t && t < knots[i + 1] { 1.0 } else { 0.0 });
    }

    let left_denominator = knots[i + order - 1] - knots[i];
    let right_denominator = knots[i + order] - knots[i + 1];
    if left_denominator == 0.0 || right_denominator == 0.0 {
        return Err(SplineError::ZeroDenominator { index: i, order });
    }

    let left = (t - knots[i]) / left_denominator * nurbs_basis(i, order - 1, t, knots)?;
    let right = (knots[i + order] - t) / right_denominator * nurbs_basis(i + 1, order - 1, t, knots)?;
    Ok(left + right)
}

/// Rational B-spline point at parameter `u`
///
/// `knots.len()` must equal `points.len() + order`.
pub fn interpolate_nurbs(
    u: f32,
    points: &[Vec3],
    weights: &[f32],
    knots: &[f32],
    order: usize,
) -> SplineResult<Vec3> {
    if knots.len() != points.len() + order || weights.len() != points.len() || order == 0 {
        return Err(SplineError::InvalidKnotCount {
            knots: knots.len(),
            weights: weights.len(),
        });
    }

    let mut numerator = Vec3::ZERO;
    let mut denominator = 0.0;
    for (i, (&point, &weight)) in points.iter().zip(weights).enumerate() {
        let value = weight * nurbs_basis(i, order, u, knots)?;
        numerator += point * value;
        denominator += value;
    }

    if denominator == 0.0 {
        return Err(SplineError::ZeroDenominator { index: 0, order });
    }
    Ok(numerator / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catmull_rom_hits_inner_points() {
        let p0 = Vec3::new(-1.0, 0.0, 0.0);
        let p1 = Vec3::ZERO;
        let p2 = Vec3::new(1.0, 1.0, 0.0);
        let p3 = Vec3::new(2.0, 1.0, 0.0);
        assert!(interpolate_catmull_rom(0.0, 0.5, p0, p1, p2, p3).approx_eq(p1));
        assert!(interpolate_catmull_rom(1.0, 0.5, p0, p1, p2, p3).approx_eq(p2));
    }

    #[test]
    fn test_bezier_endpoints_and_midpoint() {
        let p0 = Vec3::ZERO;
        let p1 = Vec3::new(0.0, 1.0, 0.0);
        let p2 = Vec3::new(1.0, 1.0, 0.0);
        let p3 = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(interpolate_bezier(0.0, p0, p1, p2, p3), p0);
        assert_eq!(interpolate_bezier(1.0, p0, p1, p2, p3), p3);
        let mid = interpolate_bezier(0.5, p0, p1, p2, p3);
        assert!(mid.approx_eq(Vec3::new(0.5, 0.75, 0.0)));
    }

    #[test]
    fn test_straight_segment_lengths() {
        let a = Vec3::ZERO;
        let b = Vec3::new(1.0, 0.0, 0.0);
        let c = Vec3::new(2.0, 0.0, 0.0);
        let d = Vec3::new(3.0, 0.0, 0.0);
        assert!((catmull_rom_length(a, b, c, d, 0.0, 1.0, 0.5) - 1.0).abs() < 1e-3);
        assert!((bezier_length(a, b, c, d) - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_prepare_knots_spreads_repeats() {
        let mut knots = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        prepare_nurbs_knots(&mut knots);
        assert!((knots[1] - 0.0001).abs() < 1e-7);
        assert!((knots[2] - 0.0002).abs() < 1e-7);
        assert_eq!(knots[3], 1.0);
        assert!((knots[4] - 1.0001).abs() < 1e-6);
        assert!((knots[5] - 1.0002).abs() < 1e-6);
        assert!(knots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_validate_knots() {
        assert!(validate_knots(&[0.0, 0.0, 1.0]).is_ok());
        assert_eq!(
            validate_knots(&[0.0, 1.0, 0.5]),
            Err(SplineError::DecreasingKnots { index: 2 })
        );
    }

    #[test]
    fn test_basis_zero_denominator() {
        let knots = [0.0, 0.0, 1.0];
        assert!(matches!(
            nurbs_basis(0, 2, 0.5, &knots),
            Err(SplineError::ZeroDenominator { .. })
        ));
    }

    #[test]
    fn test_basis_short_knot_vector() {
        let knots = [0.0, 0.5, 1.0];
        assert_eq!(
            nurbs_basis(1, 2, 0.5, &knots),
            Err(SplineError::InvalidKnotCount { knots: 3, weights: 2 })
        );
        assert!(nurbs_basis(2, 1, 0.5, &knots).is_err());
        assert_eq!(nurbs_basis(1, 1, 0.75, &knots), Ok(1.0));
    }

    #[test]
    fn test_nurbs_partition_of_unity() {
        let mut knots = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        prepare_nurbs_knots(&mut knots);
        let points = [Vec3::ZERO, Vec3::new(1.0, 2.0, 0.0), Vec3::new(2.0, 0.0, 0.0)];
        let weights = [1.0, 1.0, 1.0];
        let p = interpolate_nurbs(0.5, &points, &weights, &knots, 3).unwrap();
        // quadratic Bezier midpoint with uniform weights
        assert!((p.x - 1.0).abs() < 0.01);
        assert!((p.y - 1.0).abs() < 0.01);
    }
}
