//! Noise primitives over the shared stream.
//!
//! Every call consumes draws from the context's single generator, so the
//! sequence of values an installer sees depends on what ran before it.

use std::cell::Cell;
use std::f64::consts::PI;

use super::prng::{SharedPrng, TWO_POW_32};
use crate::config::FingerprintConfig;

/// Smallest non-zero draw; stands in for a zero `u1` so `ln` stays finite.
pub const MIN_UNIT_DRAW: f64 = 1.0 / TWO_POW_32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseDistribution {
    Uniform,
    Gaussian,
}

/// Uniform and Gaussian noise drawn from one [`SharedPrng`].
#[derive(Debug)]
pub struct NoiseEngine {
    prng: SharedPrng,
    spare: Cell<Option<f64>>,
    distribution: NoiseDistribution,
}

impl NoiseEngine {
    pub fn new(prng: SharedPrng, distribution: NoiseDistribution) -> Self {
        Self {
            prng,
            spare: Cell::new(None),
            distribution,
        }
    }

    pub fn from_config(prng: SharedPrng, config: &FingerprintConfig) -> Self {
        let distribution = if config.use_gaussian_noise {
            NoiseDistribution::Gaussian
        } else {
            NoiseDistribution::Uniform
        };
        Self::new(prng, distribution)
    }

    pub fn prng(&self) -> &SharedPrng {
        &self.prng
    }

    pub fn distribution(&self) -> NoiseDistribution {
        self.distribution
    }

    /// Raw draw in [0, 1).
    #[inline]
    pub fn draw(&self) -> f64 {
        self.prng.draw()
    }

    /// `(draw - 0.5) * scale`, in `[-scale/2, scale/2)`.
    #[inline]
    pub fn uniform(&self, scale: f64) -> f64 {
        (self.prng.draw() - 0.5) * scale
    }

    /// Standard normal via Box-Muller.
    ///
    /// Each transform yields two values; the second is cached and returned
    /// by the next call without consuming draws.
    pub fn standard_normal(&self) -> f64 {
        if let Some(spare) = self.spare.take() {
            return spare;
        }

        let mut u1 = self.prng.draw();
        if u1 == 0.0 {
            u1 = MIN_UNIT_DRAW;
        }
        let u2 = self.prng.draw();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        self.spare.set(Some(radius * theta.sin()));
        radius * theta.cos()
    }

    /// `mean + stddev * z`.
    #[inline]
    pub fn gaussian(&self, mean: f64, stddev: f64) -> f64 {
        mean + stddev * self.standard_normal()
    }

    /// Noise of the configured distribution at `scale`.
    ///
    /// Gaussian uses `scale` as the standard deviation.
    #[inline]
    pub fn noise(&self, scale: f64) -> f64 {
        match self.distribution {
            NoiseDistribution::Gaussian => self.gaussian(0.0, scale),
            NoiseDistribution::Uniform => self.uniform(scale),
        }
    }
}
