pub trait FloatExt {
    fn approximately_eq(self, other: Self) -> bool;

    /// True when `|self - other| <= tolerance * max(|self|, |other|)`,
    /// falling back to an absolute comparison near zero.
    fn relative_eq(self, other: Self, tolerance: Self) -> bool;
}

impl FloatExt for f32 {
    fn approximately_eq(self, other: Self) -> bool {
        (self - other).abs() < crate::EPSILON as f32
    }

    fn relative_eq(self, other: Self, tolerance: Self) -> bool {
        let scale = self.abs().max(other.abs());
        if scale < crate::EPSILON as f32 {
            return self.approximately_eq(other);
        }
        (self - other).abs() <= tolerance * scale
    }
}

impl FloatExt for f64 {
    fn approximately_eq(self, other: Self) -> bool {
        (self - other).abs() < crate::EPSILON
    }

    fn relative_eq(self, other: Self, tolerance: Self) -> bool {
        let scale = self.abs().max(other.abs());
        if scale < crate::EPSILON {
            return self.approximately_eq(other);
        }
        (self - other).abs() <= tolerance * scale
    }
}
