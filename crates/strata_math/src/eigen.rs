//! Eigen-decomposition of symmetric 3x3 matrices
//!
//! Closed form: the characteristic cubic is solved in `f64`, then each
//! eigenvector is recovered from the rows of `A - λI`. Only the upper
//! triangle of the input is read. A matrix whose shifted forms have rank
//! zero (a multiple of the identity) reports the coordinate axes.

use crate::consts::ZERO_TOLERANCE;
use crate::matrix::Mat3;
use crate::vector::Vec3;

const ONE_THIRD: f64 = 1.0 / 3.0;
const ROOT_THREE: f64 = 1.732_050_807_568_877_2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Eigen3 {
    /// Eigenvalues in increasing order
    pub values: [f32; 3],
    /// Unit eigenvectors, `vectors[i]` pairs with `values[i]`
    pub vectors: [Vec3; 3],
}

impl Eigen3 {
    pub fn new(data: &Mat3) -> Self {
        let mut scaled = *data;
        let max_magnitude = scale_matrix(&mut scaled);

        let roots = compute_roots(&scaled);
        let mut eigen = Self {
            values: [roots[0] as f32, roots[1] as f32, roots[2] as f32],
            vectors: [Vec3::X, Vec3::Y, Vec3::Z],
        };

        let mut max_values = [0.0_f32; 3];
        let mut max_rows = [Vec3::ZERO; 3];
        for i in 0..3 {
            let mut shifted = scaled;
            for d in 0..3 {
                shifted.set(d, d, shifted.get(d, d) - eigen.values[i]);
            }
            match positive_rank(&shifted) {
                Some((value, row)) => {
                    max_values[i] = value;
                    max_rows[i] = row;
                }
                None => {
                    // Rank zero: any basis diagonalizes it
                    eigen.rescale(max_magnitude);
                    return eigen;
                }
            }
        }

        let mut largest = 0;
        if max_values[1] > max_values[largest] {
            largest = 1;
        }
        if max_values[2] > max_values[largest] {
            largest = 2;
        }

        let row = max_rows[largest].normalize();
        match largest {
            0 => eigen.compute_vectors(&scaled, row, 1, 2, 0),
            1 => eigen.compute_vectors(&scaled, row, 2, 0, 1),
            _ => eigen.compute_vectors(&scaled, row, 0, 1, 2),
        }

        eigen.rescale(max_magnitude);
        eigen
    }

    fn rescale(&mut self, max_magnitude: f32) {
        if max_magnitude > 1.0 {
            for v in &mut self.values {
                *v *= max_magnitude;
            }
        }
    }

    /// Fill three eigenvectors given `vect`, a unit row of `A - λ[i3]I`
    fn compute_vectors(&mut self, mat: &Mat3, vect: Vec3, i1: usize, i2: usize, i3: usize) {
        let (u, v) = vect.generate_complement_basis();

        let temp = *mat * u;
        let p00 = self.values[i3] - u.dot(temp);
        let p01 = v.dot(temp);
        let p11 = self.values[i3] - v.dot(*mat * v);
        self.vectors[i3] = solve_2x2(p00, p01, p11, u, v);

        let s = vect.cross(self.vectors[i3]);
        let temp = *mat * vect;
        let p00 = self.values[i1] - vect.dot(temp);
        let p01 = s.dot(temp);
        let p11 = self.values[i1] - s.dot(*mat * s);
        self.vectors[i1] = solve_2x2(p00, p01, p11, vect, s);

        self.vectors[i2] = self.vectors[i3].cross(self.vectors[i1]);
    }
}

/// Unit null vector of the 2x2 system `[p00 p01; p01 p11]` in the `(a, b)` basis
fn solve_2x2(p00: f32, p01: f32, p11: f32, a: Vec3, b: Vec3) -> Vec3 {
    let mut max = p00.abs();
    let mut row = 0;
    if p01.abs() > max {
        max = p01.abs();
    }
    if p11.abs() > max {
        max = p11.abs();
        row = 1;
    }

    if max >= ZERO_TOLERANCE {
        if row == 0 {
            let inv = 1.0 / (p00 * p00 + p01 * p01).sqrt();
            a * (p01 * inv) + b * (p00 * inv)
        } else {
            let inv = 1.0 / (p11 * p11 + p01 * p01).sqrt();
            a * (p11 * inv) + b * (p01 * inv)
        }
    } else if row == 0 {
        b
    } else {
        a
    }
}

/// Scale large matrices into `[-1, 1]`; returns the largest entry magnitude
fn scale_matrix(mat: &mut Mat3) -> f32 {
    let max = [
        mat.get(0, 0),
        mat.get(0, 1),
        mat.get(0, 2),
        mat.get(1, 1),
        mat.get(1, 2),
        mat.get(2, 2),
    ]
    .iter()
    .fold(0.0_f32, |acc, v| acc.max(v.abs()));

    if max > 1.0 {
        *mat = *mat * (1.0 / max);
    }
    max
}

/// Largest upper-triangle entry and its row, or None when every entry is
/// below tolerance
fn positive_rank(mat: &Mat3) -> Option<(f32, Vec3)> {
    let mut max_value = -1.0_f32;
    let mut max_row = 0;
    for row in 0..3 {
        for col in row..3 {
            let abs = mat.get(row, col).abs();
            if abs > max_value {
                max_value = abs;
                max_row = row;
            }
        }
    }
    (max_value >= ZERO_TOLERANCE).then(|| (max_value, mat.row(max_row)))
}

/// Roots of the characteristic cubic in increasing order
fn compute_roots(mat: &Mat3) -> [f64; 3] {
    let a = mat.get(0, 0) as f64;
    let b = mat.get(0, 1) as f64;
    let c = mat.get(0, 2) as f64;
    let d = mat.get(1, 1) as f64;
    let e = mat.get(1, 2) as f64;
    let f = mat.get(2, 2) as f64;

    // x^3 - c2*x^2 + c1*x - c0 = 0
    let char0 = a * d * f + 2.0 * b * c * e - a * e * e - d * c * c - f * b * b;
    let char1 = a * d - b * b + a * f - c * c + d * f - e * e;
    let char2 = a + d + f;

    let char2_div3 = char2 * ONE_THIRD;
    let abc_div3 = ((char1 - char2 * char2_div3) * ONE_THIRD).min(0.0);

    let mb_div2 = 0.5 * (char0 + char2_div3 * (2.0 * char2_div3 * char2_div3 - char1));
    let q = (mb_div2 * mb_div2 + abc_div3 * abc_div3 * abc_div3).min(0.0);

    let magnitude = (-abc_div3).sqrt();
    let angle = (-q).sqrt().atan2(mb_div2) * ONE_THIRD;
    let (sin, cos) = angle.sin_cos();
    let mut roots = [
        char2_div3 + 2.0 * magnitude * cos,
        char2_div3 - magnitude * (cos + ROOT_THREE * sin),
        char2_div3 - magnitude * (cos - ROOT_THREE * sin),
    ];
    roots.sort_by(f64::total_cmp);
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn symmetric(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Mat3 {
        Mat3::from_cols(Vec3::new(a, b, c), Vec3::new(b, d, e), Vec3::new(c, e, f))
    }

    fn assert_decomposes(m: &Mat3, eigen: &Eigen3) {
        for i in 0..3 {
            let v = eigen.vectors[i];
            assert!((v.length() - 1.0).abs() < 1e-3, "vector {i} not unit: {v:?}");
            let av = *m * v;
            let lv = v * eigen.values[i];
            assert!((av - lv).length() < 1e-3, "A v != λ v for {i}: {av:?} vs {lv:?}");
        }
    }

    #[test]
    fn test_diagonal() {
        let m = symmetric(3.0, 0.0, 0.0, 1.0, 0.0, 2.0);
        let eigen = Eigen3::new(&m);
        assert_abs_diff_eq!(eigen.values[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(eigen.values[1], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(eigen.values[2], 3.0, epsilon = 1e-5);
        assert_decomposes(&m, &eigen);
    }

    #[test]
    fn test_general_symmetric() {
        let m = symmetric(2.0, 1.0, 0.0, 2.0, 0.0, 5.0);
        let eigen = Eigen3::new(&m);
        assert_abs_diff_eq!(eigen.values[0], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(eigen.values[1], 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(eigen.values[2], 5.0, epsilon = 1e-4);
        assert_decomposes(&m, &eigen);
    }

    #[test]
    fn test_large_entries_are_rescaled() {
        let m = symmetric(200.0, 100.0, 0.0, 200.0, 0.0, 500.0);
        let eigen = Eigen3::new(&m);
        assert_abs_diff_eq!(eigen.values[0], 100.0, epsilon = 1e-2);
        assert_abs_diff_eq!(eigen.values[2], 500.0, epsilon = 1e-2);
        assert_decomposes(&m, &eigen);
    }

    #[test]
    fn test_identity_falls_back_to_axes() {
        let eigen = Eigen3::new(&(Mat3::IDENTITY * 4.0));
        assert_eq!(eigen.vectors, [Vec3::X, Vec3::Y, Vec3::Z]);
        for v in eigen.values {
            assert!((v - 4.0).abs() < 1e-5);
        }
    }
}
