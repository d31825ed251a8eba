//! Resampling schemes
//!
//! Each scheme draws `n` indices into a weight slice with probability proportional to weight. The
//! functions return indices only; the filter copies the selected particles by value so duplicates never
//! share state.
//!
//! - Multinomial: `n` independent draws with replacement. This is the default and the classic
//!   importance-resampling step.
//! - Systematic: a single uniform offset and `n` evenly spaced pointers through the cumulative weights.
//! - Stratified: one uniform draw inside each of `n` equal strata of the cumulative weights.
//! - Residual: deterministic `floor(n w_i)` copies, with the remainder drawn multinomially from the
//!   residual weights.
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleResamplingStrategy {
    #[default]
    Multinomial,
    Systematic,
    Stratified,
    Residual,
}

impl ParticleResamplingStrategy {
    /// Draw `n` indices into `weights` using this strategy.
    ///
    /// # Errors
    /// [FilterError::DegenerateWeights] if the weights are empty, negative, non-finite or sum to zero.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        match self {
            ParticleResamplingStrategy::Multinomial => multinomial_resample(weights, n, rng),
            ParticleResamplingStrategy::Systematic => systematic_resample(weights, n, rng),
            ParticleResamplingStrategy::Stratified => stratified_resample(weights, n, rng),
            ParticleResamplingStrategy::Residual => residual_resample(weights, n, rng),
        }
    }
}

/// Validate a weight slice and return its sum.
fn weight_sum(weights: &[f64]) -> Result<f64> {
    let sum: f64 = weights.iter().sum();
    let valid = !weights.is_empty()
        && weights.iter().all(|w| w.is_finite() && *w >= 0.0)
        && sum > 0.0
        && sum.is_finite();
    if valid {
        Ok(sum)
    } else {
        Err(FilterError::DegenerateWeights { sum })
    }
}

/// Independent draws with replacement, probability proportional to weight.
pub fn multinomial_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let sum = weight_sum(weights)?;
    let distribution =
        WeightedIndex::new(weights).map_err(|_| FilterError::DegenerateWeights { sum })?;
    Ok((0..n).map(|_| distribution.sample(rng)).collect())
}

/// Evenly spaced pointers with one shared uniform offset.
pub fn systematic_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let offset = rng.random::<f64>();
    let positions: Vec<f64> = (0..n).map(|i| (i as f64 + offset) / n as f64).collect();
    select_positions(weights, &positions)
}

/// One uniform pointer inside each equal-width stratum.
pub fn stratified_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let positions: Vec<f64> = (0..n)
        .map(|i| (i as f64 + rng.random::<f64>()) / n as f64)
        .collect();
    select_positions(weights, &positions)
}

/// Deterministic copies of `floor(n w_i)` plus multinomial draws from the residuals.
pub fn residual_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let sum = weight_sum(weights)?;
    let mut indices = Vec::with_capacity(n);
    let mut residuals = Vec::with_capacity(weights.len());
    for (i, w) in weights.iter().enumerate() {
        let expected = w / sum * n as f64;
        let copies = expected.floor() as usize;
        indices.extend(std::iter::repeat_n(i, copies));
        residuals.push(expected - copies as f64);
    }
    let remaining = n.saturating_sub(indices.len());
    if remaining > 0 {
        let drawn = if weight_sum(&residuals).is_ok() {
            multinomial_resample(&residuals, remaining, rng)?
        } else {
            multinomial_resample(weights, remaining, rng)?
        };
        indices.extend(drawn);
    }
    indices.truncate(n);
    Ok(indices)
}

/// Map sorted positions in [0, 1) onto indices through the normalized cumulative weights.
fn select_positions(weights: &[f64], positions: &[f64]) -> Result<Vec<usize>> {
    let sum = weight_sum(weights)?;
    let last = weights.len() - 1;
    let mut indices = Vec::with_capacity(positions.len());
    let mut i = 0;
    let mut cumulative = weights[0] / sum;
    for &position in positions {
        while position >= cumulative && i < last {
            i += 1;
            cumulative += weights[i] / sum;
        }
        indices.push(i);
    }
    Ok(indices)
}
