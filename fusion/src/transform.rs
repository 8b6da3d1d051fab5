//! Affine transform from a view's voxel space into the shared output space.

use glam::{DAffine3, DMat3, DVec3};
use serde::{Deserialize, Serialize};

/// Transforms with a smaller absolute determinant are treated as singular.
const MIN_DETERMINANT: f64 = 1e-12;

/// 3D affine map `p' = M p + t` from view-local voxel coordinates to output space.
///
/// Fusion samples views by mapping output locations back into each view, so the
/// engine works with [`Affine3::inverse`]; [`Affine3::apply`] is used for
/// bounding boxes and simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine3 {
    affine: DAffine3,
}

impl Default for Affine3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Affine3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = self.affine.matrix3.transpose().to_cols_array();
        let t = self.affine.translation;
        write!(
            f,
            "[{:.4} {:.4} {:.4} {:.2}; {:.4} {:.4} {:.4} {:.2}; {:.4} {:.4} {:.4} {:.2}]",
            m[0], m[1], m[2], t.x, m[3], m[4], m[5], t.y, m[6], m[7], m[8], t.z
        )
    }
}

impl Affine3 {
    pub fn identity() -> Self {
        Self {
            affine: DAffine3::IDENTITY,
        }
    }

    pub fn translation(t: DVec3) -> Self {
        Self {
            affine: DAffine3::from_translation(t),
        }
    }

    /// Anisotropic scaling, e.g. stretching z by the axial-to-lateral voxel ratio.
    pub fn scale(s: DVec3) -> Self {
        Self {
            affine: DAffine3::from_scale(s),
        }
    }

    /// Rotation about an axis parallel to y through `center`.
    ///
    /// Light-sheet acquisitions rotate the sample about the vertical axis, so
    /// this is the natural model for multi-angle views.
    pub fn rotation_y_around(center: DVec3, angle: f64) -> Self {
        let affine = DAffine3::from_translation(center)
            * DAffine3::from_rotation_y(angle)
            * DAffine3::from_translation(-center);
        Self { affine }
    }

    /// From a row-major 3x4 matrix `[m00 m01 m02 t0 m10 m11 m12 t1 m20 m21 m22 t2]`.
    pub fn from_row_major(m: [f64; 12]) -> Self {
        let matrix3 = DMat3::from_cols_array(&[m[0], m[1], m[2], m[4], m[5], m[6], m[8], m[9], m[10]])
            .transpose();
        let translation = DVec3::new(m[3], m[7], m[11]);
        Self {
            affine: DAffine3::from_mat3_translation(matrix3, translation),
        }
    }

    pub fn from_matrix(matrix: DMat3, translation: DVec3) -> Self {
        Self {
            affine: DAffine3::from_mat3_translation(matrix, translation),
        }
    }

    #[inline]
    pub fn apply(&self, p: DVec3) -> DVec3 {
        self.affine.transform_point3(p)
    }

    /// `self * other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            affine: self.affine * other.affine,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.affine.matrix3.determinant()
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > MIN_DETERMINANT && self.affine.translation.is_finite()
    }

    /// The inverse map, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        if !self.is_invertible() {
            return None;
        }
        Some(Self {
            affine: self.affine.inverse(),
        })
    }

    /// Bounding box of the transformed axis-aligned box `[min, max]`.
    ///
    /// All eight corners are mapped, so the result is exact for any affine map.
    pub fn estimate_bounds(&self, min: DVec3, max: DVec3) -> (DVec3, DVec3) {
        let mut lo = DVec3::splat(f64::MAX);
        let mut hi = DVec3::splat(f64::MIN);
        for corner in 0..8 {
            let p = DVec3::new(
                if corner & 1 == 0 { min.x } else { max.x },
                if corner & 2 == 0 { min.y } else { max.y },
                if corner & 4 == 0 { min.z } else { max.z },
            );
            let t = self.apply(p);
            lo = lo.min(t);
            hi = hi.max(t);
        }
        (lo, hi)
    }

    pub fn matrix(&self) -> DMat3 {
        self.affine.matrix3
    }

    pub fn translation_components(&self) -> DVec3 {
        self.affine.translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_vec_close(a: DVec3, b: DVec3) {
        assert!((a - b).length() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_identity_maps_points_unchanged() {
        let p = DVec3::new(1.5, -2.0, 7.25);
        assert_eq!(Affine3::identity().apply(p), p);
    }

    #[test]
    fn test_row_major_layout() {
        let t = Affine3::from_row_major([
            1.0, 0.0, 0.0, 10.0, //
            0.0, 2.0, 0.0, 20.0, //
            0.0, 0.0, 3.0, 30.0,
        ]);
        assert_vec_close(t.apply(DVec3::new(1.0, 1.0, 1.0)), DVec3::new(11.0, 22.0, 33.0));
        assert!((t.determinant() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Affine3::rotation_y_around(DVec3::new(5.0, 5.0, 5.0), 0.7)
            .compose(&Affine3::scale(DVec3::new(1.0, 1.0, 3.5)))
            .compose(&Affine3::translation(DVec3::new(2.0, -1.0, 4.0)));
        let inv = t.inverse().unwrap();
        let p = DVec3::new(3.0, 8.0, -2.0);
        assert_vec_close(inv.apply(t.apply(p)), p);
    }

    #[test]
    fn test_singular_transform_has_no_inverse() {
        let flat = Affine3::scale(DVec3::new(1.0, 1.0, 0.0));
        assert!(!flat.is_invertible());
        assert!(flat.inverse().is_none());
    }

    #[test]
    fn test_rotation_about_center_keeps_center_fixed() {
        let center = DVec3::new(10.0, 3.0, 10.0);
        let t = Affine3::rotation_y_around(center, FRAC_PI_2);
        assert_vec_close(t.apply(center), center);
    }

    #[test]
    fn test_estimate_bounds_translation() {
        let t = Affine3::translation(DVec3::new(2.0, 0.0, -1.0));
        let (lo, hi) = t.estimate_bounds(DVec3::ZERO, DVec3::new(4.0, 4.0, 4.0));
        assert_vec_close(lo, DVec3::new(2.0, 0.0, -1.0));
        assert_vec_close(hi, DVec3::new(6.0, 4.0, 3.0));
    }

    #[test]
    fn test_estimate_bounds_rotation_covers_all_corners() {
        let t = Affine3::rotation_y_around(DVec3::ZERO, FRAC_PI_2);
        let (lo, hi) = t.estimate_bounds(DVec3::ZERO, DVec3::new(4.0, 2.0, 6.0));
        // Rotating by 90 degrees about y maps (x, z) to (z, -x).
        assert_vec_close(lo, DVec3::new(0.0, 0.0, -4.0));
        assert_vec_close(hi, DVec3::new(6.0, 2.0, 0.0));
    }
}
