use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::slice;

/// Returned when the backing storage of a [`Buffer3`] cannot be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot allocate {len} elements for a {width}x{height}x{depth} buffer")]
pub struct AllocError {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub len: usize,
}

/// Dense 3D buffer stored x-fastest, then y, then z.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer3<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
    depth: usize,
}

impl<T> Buffer3<T> {
    pub fn new(width: usize, height: usize, depth: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height * depth,
            "pixels length must equal width * height * depth"
        );
        Self {
            pixels,
            width,
            height,
            depth,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> &T {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        &self.pixels[self.index(x, y, z)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize, z: usize) -> &mut T {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        let idx = self.index(x, y, z);
        &mut self.pixels[idx]
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    /// Whether a signed voxel coordinate lies inside the buffer.
    #[inline]
    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < self.width
            && (y as usize) < self.height
            && (z as usize) < self.depth
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        [self.width, self.height, self.depth]
    }

    /// Number of elements in one z-plane.
    #[inline]
    pub fn plane_len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn plane(&self, z: usize) -> &[T] {
        let len = self.plane_len();
        &self.pixels[z * len..(z + 1) * len]
    }

    /// Mutable z-planes in ascending z order. Yields nothing for an empty buffer.
    #[inline]
    pub fn planes_mut(&mut self) -> slice::ChunksMut<'_, T> {
        let len = self.plane_len().max(1);
        self.pixels.chunks_mut(len)
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.pixels
    }
}

impl<T: Clone> Buffer3<T> {
    pub fn new_filled(width: usize, height: usize, depth: usize, value: T) -> Self {
        Self {
            pixels: vec![value; width * height * depth],
            width,
            height,
            depth,
        }
    }

    /// Like [`Buffer3::new_filled`] but reports allocation failure instead of aborting.
    pub fn try_new_filled(
        width: usize,
        height: usize,
        depth: usize,
        value: T,
    ) -> Result<Self, AllocError> {
        let err = || AllocError {
            width,
            height,
            depth,
            len: width.saturating_mul(height).saturating_mul(depth),
        };
        let len = width
            .checked_mul(height)
            .and_then(|wh| wh.checked_mul(depth))
            .ok_or_else(err)?;

        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|_| err())?;
        pixels.resize(len, value);

        Ok(Self {
            pixels,
            width,
            height,
            depth,
        })
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.pixels.fill(value);
    }
}

impl<T: Default + Clone> Buffer3<T> {
    pub fn new_default(width: usize, height: usize, depth: usize) -> Self {
        Self::new_filled(width, height, depth, T::default())
    }

    pub fn try_new_default(width: usize, height: usize, depth: usize) -> Result<Self, AllocError> {
        Self::try_new_filled(width, height, depth, T::default())
    }
}

impl<T> Index<(usize, usize, usize)> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y, z): (usize, usize, usize)) -> &Self::Output {
        &self.pixels[(z * self.height + y) * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, (x, y, z): (usize, usize, usize)) -> &mut Self::Output {
        &mut self.pixels[(z * self.height + y) * self.width + x]
    }
}

impl<T> Deref for Buffer3<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        &self.pixels
    }
}

impl<T> DerefMut for Buffer3<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }
}

impl<T> From<Buffer3<T>> for Vec<T> {
    #[inline]
    fn from(buffer: Buffer3<T>) -> Self {
        buffer.pixels
    }
}
