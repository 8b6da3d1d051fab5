use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::Volume;

/// Running weighted-intensity and weight sums over the output grid.
#[derive(Debug, Clone)]
pub struct Accumulator {
    intensity: Volume,
    weight: Volume,
}

impl Accumulator {
    /// Allocates both sums, zeroed. Fails instead of aborting when memory is short.
    pub fn new(dims: [usize; 3]) -> Result<Self> {
        let alloc = || {
            Volume::try_new_default(dims[0], dims[1], dims[2])
                .map_err(|_| Error::OutputAllocationFailure { dims })
        };
        Ok(Self {
            intensity: alloc()?,
            weight: alloc()?,
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.intensity.dims()
    }

    pub fn clear(&mut self) {
        self.intensity.fill(0.0);
        self.weight.fill(0.0);
    }

    /// Divides intensity by weight where the weight is positive, zero elsewhere.
    pub fn normalize(&mut self) {
        self.intensity
            .pixels_mut()
            .par_iter_mut()
            .zip(self.weight.pixels().par_iter())
            .for_each(|(value, &w)| {
                *value = if w > 0.0 { *value / w } else { 0.0 };
            });
    }

    /// Matching z-planes of the intensity and weight sums, in ascending z.
    pub fn planes_mut(&mut self) -> impl Iterator<Item = (&mut [f32], &mut [f32])> {
        self.intensity.planes_mut().zip(self.weight.planes_mut())
    }

    #[inline]
    pub fn add(&mut self, index: usize, value: f32, weight: f32) {
        self.intensity.pixels_mut()[index] += value;
        self.weight.pixels_mut()[index] += weight;
    }

    pub fn intensity(&self) -> &Volume {
        &self.intensity
    }

    pub fn weight(&self) -> &Volume {
        &self.weight
    }

    /// `(intensity, weight)`.
    pub fn into_parts(self) -> (Volume, Volume) {
        (self.intensity, self.weight)
    }
}
