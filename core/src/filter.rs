//! Particle filter for landmark-based localization
//!
//! [ParticleFilter] holds a fixed-size population of [Particle]s and runs the filter cycle:
//!
//! 1. [ParticleFilter::init]: sample the population around a noisy initial pose estimate (once).
//! 2. [ParticleFilter::predict]: perturb each particle with process noise and advance it with the motion model.
//! 3. [ParticleFilter::update_weights]: transform every observation into the map frame for each particle,
//!    associate it with the nearest landmark and multiply the bivariate Gaussian likelihoods into the
//!    particle weight, then normalize the weights across the population.
//! 4. [ParticleFilter::resample]: draw a new population with probability proportional to weight.
//!
//! The filter owns its random number generator. It is seeded from [FilterConfig::seed] or injected with
//! [ParticleFilter::new_with_rng], so a run is reproducible for a fixed seed. When
//! [FilterConfig::parallel] is set, the prediction and weighting loops run on the rayon thread pool;
//! each particle then draws from its own generator seeded from the filter's generator and the weight sum
//! is reduced after the parallel pass.
use std::fmt::{self, Debug};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rayon::prelude::*;

use crate::config::{FilterConfig, LandmarkNoise, PoseNoise};
use crate::error::{FilterError, Result};
use crate::map::{Map, Observation};
use crate::measurements::landmark_likelihood;
use crate::motion::{Control, ProcessNoise, normal, propagate};
use crate::particle::{Particle, PoseEstimate, best_particle};
use crate::{Pose, normalize_angle};

pub struct ParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    /// Normalized weights mirrored from the particles, used for resampling
    weights: Vec<f64>,
    rng: StdRng,
    is_initialized: bool,
}

impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self.weights.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_weight = self.weights.iter().cloned().fold(0.0, f64::max);
        let mut s = f.debug_struct("ParticleFilter");
        s.field("initialized", &self.is_initialized)
            .field("num_particles", &self.particles.len())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            );
        if let Ok(estimate) = self.estimate() {
            s.field("estimate", &format_args!("{}", estimate));
        }
        s.finish()
    }
}

impl ParticleFilter {
    /// Create an uninitialized filter, seeding its generator from the configuration.
    ///
    /// A `None` seed draws the seed from the thread-local generator.
    ///
    /// # Errors
    /// [FilterError::InvalidConfig] if the configuration fails validation.
    pub fn new(config: FilterConfig) -> Result<Self> {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self::new_with_rng(config, StdRng::seed_from_u64(seed))
    }

    /// Create an uninitialized filter with an explicit seed, overriding the configured one.
    pub fn new_with_seed(config: FilterConfig, seed: u64) -> Result<Self> {
        Self::new_with_rng(config, StdRng::seed_from_u64(seed))
    }

    /// Create an uninitialized filter that draws from the given generator.
    pub fn new_with_rng(config: FilterConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        Ok(ParticleFilter {
            particles: Vec::with_capacity(config.num_particles),
            weights: Vec::with_capacity(config.num_particles),
            config,
            rng,
            is_initialized: false,
        })
    }

    /// Create an initialized filter from an existing population.
    ///
    /// Identifiers are reassigned to the particle index and the weight vector mirrors the particle weights.
    /// The configured particle count is replaced by the population size.
    ///
    /// # Errors
    /// [FilterError::InvalidConfig] for an empty population, a negative or non-finite weight, or weights
    /// that sum to zero.
    pub fn from_particles(
        mut config: FilterConfig,
        mut particles: Vec<Particle>,
        rng: StdRng,
    ) -> Result<Self> {
        if particles.is_empty() {
            return Err(FilterError::InvalidConfig(
                "initial population must not be empty".to_string(),
            ));
        }
        if let Some(bad) = particles
            .iter()
            .find(|p| !(p.weight.is_finite() && p.weight >= 0.0))
        {
            return Err(FilterError::InvalidConfig(format!(
                "particle weights must be finite and non-negative, got {}",
                bad.weight
            )));
        }
        if particles.iter().all(|p| p.weight == 0.0) {
            return Err(FilterError::InvalidConfig(
                "initial population has zero total weight".to_string(),
            ));
        }
        config.num_particles = particles.len();
        config.validate()?;
        for (i, particle) in particles.iter_mut().enumerate() {
            particle.id = i;
            particle.pose.theta = normalize_angle(particle.pose.theta);
        }
        let weights = particles.iter().map(|p| p.weight).collect();
        Ok(ParticleFilter {
            config,
            particles,
            weights,
            rng,
            is_initialized: true,
        })
    }

    /// Sample the population around an initial pose estimate using the configured position noise.
    pub fn init(&mut self, estimate: Pose) -> Result<()> {
        let std = self.config.position_std;
        self.init_with_std(estimate, &std)
    }

    /// Sample `num_particles` particles from independent Gaussians centred on `estimate`.
    ///
    /// Each particle gets weight 1.0 and its index as identifier; headings are normalized.
    ///
    /// # Errors
    /// - [FilterError::AlreadyInitialized] if the filter already holds a population.
    /// - [FilterError::InvalidConfig] if a standard deviation is not strictly positive.
    pub fn init_with_std(&mut self, estimate: Pose, std: &PoseNoise) -> Result<()> {
        if self.is_initialized {
            return Err(FilterError::AlreadyInitialized);
        }
        std.validate("initial pose std")?;
        let dist_x = normal(estimate.x, std.x)?;
        let dist_y = normal(estimate.y, std.y)?;
        let dist_theta = normal(estimate.theta, std.theta)?;

        let n = self.config.num_particles;
        self.particles.clear();
        for id in 0..n {
            let pose = Pose {
                x: dist_x.sample(&mut self.rng),
                y: dist_y.sample(&mut self.rng),
                theta: normalize_angle(dist_theta.sample(&mut self.rng)),
            };
            self.particles.push(Particle::new(id, pose, 1.0));
        }
        self.weights = vec![1.0; n];
        self.is_initialized = true;
        debug!("Initialized {} particles around {}", n, estimate);
        Ok(())
    }

    /// Advance every particle with the configured process noise.
    pub fn predict(&mut self, dt: f64, control: &Control) -> Result<()> {
        let std = self.config.position_std;
        self.predict_with_noise(dt, &std, control)
    }

    /// Advance every particle: add process noise to x, y and heading, then apply the motion model.
    ///
    /// # Errors
    /// - [FilterError::NotInitialized] before [ParticleFilter::init].
    /// - [FilterError::InvalidConfig] for a non-positive `dt` or standard deviation.
    pub fn predict_with_noise(&mut self, dt: f64, std: &PoseNoise, control: &Control) -> Result<()> {
        self.ensure_initialized()?;
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(FilterError::InvalidConfig(format!(
                "time step must be positive and finite, got {dt}"
            )));
        }
        let noise = ProcessNoise::new(std)?;
        if self.config.parallel {
            let seeds: Vec<u64> = (0..self.particles.len())
                .map(|_| self.rng.random())
                .collect();
            self.particles
                .par_iter_mut()
                .zip(seeds.par_iter())
                .for_each(|(particle, seed)| {
                    let mut rng = StdRng::seed_from_u64(*seed);
                    particle.pose = propagate(&particle.pose, control, dt, &noise, &mut rng);
                });
        } else {
            for particle in self.particles.iter_mut() {
                particle.pose = propagate(&particle.pose, control, dt, &noise, &mut self.rng);
            }
        }
        Ok(())
    }

    /// Weight the population against a set of observations using the configured sensor model.
    pub fn update_weights(&mut self, observations: &[Observation], map: &Map) -> Result<()> {
        let sensor_range = self.config.sensor_range;
        let landmark_std = self.config.landmark_std;
        self.update_weights_with(sensor_range, &landmark_std, observations, map)
    }

    /// Weight every particle by the product of its observation likelihoods and normalize.
    ///
    /// `sensor_range` only restricts the association candidates when
    /// [FilterConfig::range_gated_association] is enabled.
    ///
    /// # Errors
    /// - [FilterError::NotInitialized] before [ParticleFilter::init].
    /// - [FilterError::EmptyMap] if there are observations but no landmarks.
    /// - [FilterError::DegenerateWeights] if the weight sum is zero or not finite. The unnormalized
    ///   weights are still mirrored into the weight vector, so [ParticleFilter::resample] fails with the
    ///   same error until the population is weighted successfully again.
    pub fn update_weights_with(
        &mut self,
        sensor_range: f64,
        landmark_std: &LandmarkNoise,
        observations: &[Observation],
        map: &Map,
    ) -> Result<()> {
        self.ensure_initialized()?;
        landmark_std.validate("landmark std")?;
        if !observations.is_empty() && map.is_empty() {
            return Err(FilterError::EmptyMap);
        }
        let gate = if self.config.range_gated_association {
            if !(sensor_range > 0.0) {
                return Err(FilterError::InvalidConfig(format!(
                    "sensor range must be positive, got {sensor_range}"
                )));
            }
            Some(sensor_range)
        } else {
            None
        };

        let weight_sum: f64 = if self.config.parallel {
            let partials: Result<Vec<f64>> = self
                .particles
                .par_iter_mut()
                .map(|particle| weigh_particle(particle, observations, map, landmark_std, gate))
                .collect();
            partials?.iter().sum()
        } else {
            let mut sum = 0.0;
            for particle in self.particles.iter_mut() {
                sum += weigh_particle(particle, observations, map, landmark_std, gate)?;
            }
            sum
        };

        if !(weight_sum > 0.0 && weight_sum.is_finite()) {
            // keep the mirror consistent so a following resample fails on the same weights
            for (particle, weight) in self.particles.iter().zip(self.weights.iter_mut()) {
                *weight = particle.weight;
            }
            return Err(FilterError::DegenerateWeights { sum: weight_sum });
        }
        for (particle, weight) in self.particles.iter_mut().zip(self.weights.iter_mut()) {
            particle.weight /= weight_sum;
            *weight = particle.weight;
        }

        let ess = effective_sample_size(&self.weights);
        debug!(
            "Weighted {} particles against {} observations, effective sample size {:.1}",
            self.particles.len(),
            observations.len(),
            ess
        );
        let threshold = self.config.ess_warning_fraction * self.particles.len() as f64;
        if ess < threshold {
            warn!(
                "Effective sample size {:.1} is below {:.1}; the population is collapsing",
                ess, threshold
            );
        }
        Ok(())
    }

    /// Replace the population with `num_particles` draws proportional to weight.
    ///
    /// Selected particles are copied by value, including their weight and association diagnostics, and
    /// receive their new index as identifier. The new population replaces the old one in a single
    /// assignment.
    ///
    /// # Errors
    /// - [FilterError::NotInitialized] before [ParticleFilter::init].
    /// - [FilterError::DegenerateWeights] if the weight vector cannot define a distribution.
    pub fn resample(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let n = self.particles.len();
        let indices = self
            .config
            .resampling_strategy
            .resample(&self.weights, n, &mut self.rng)?;
        let resampled: Vec<Particle> = indices
            .iter()
            .enumerate()
            .map(|(new_id, &index)| {
                let mut particle = self.particles[index].clone();
                particle.id = new_id;
                particle
            })
            .collect();
        self.weights = resampled.iter().map(|p| p.weight).collect();
        self.particles = resampled;
        Ok(())
    }

    /// Run one full cycle: prediction, weighting and resampling.
    pub fn step(
        &mut self,
        dt: f64,
        control: &Control,
        observations: &[Observation],
        map: &Map,
    ) -> Result<()> {
        self.predict(dt, control)?;
        self.update_weights(observations, map)?;
        self.resample()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized {
            Ok(())
        } else {
            Err(FilterError::NotInitialized)
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    pub fn num_particles(&self) -> usize {
        self.config.num_particles
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    /// Weight vector mirrored from the particles
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// The highest-weight particle (first one on ties)
    pub fn best_particle(&self) -> Result<&Particle> {
        self.ensure_initialized()?;
        best_particle(&self.particles).ok_or(FilterError::NotInitialized)
    }

    /// Pose estimate using the configured averaging strategy
    pub fn estimate(&self) -> Result<Pose> {
        Ok(self.estimate_with_covariance()?.pose)
    }

    /// Pose estimate and covariance using the configured averaging strategy
    pub fn estimate_with_covariance(&self) -> Result<PoseEstimate> {
        self.ensure_initialized()?;
        self.config
            .averaging_strategy
            .estimate(&self.particles)
            .ok_or(FilterError::NotInitialized)
    }

    /// Effective sample size `1 / Σ w²` of the normalized weights
    pub fn effective_sample_size(&self) -> Result<f64> {
        self.ensure_initialized()?;
        Ok(effective_sample_size(&self.weights))
    }
}

/// Effective sample size of a weight slice; weights are normalized before use.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0 && sum.is_finite()) {
        return 0.0;
    }
    let sum_of_squares: f64 = weights.iter().map(|w| (w / sum).powi(2)).sum();
    1.0 / sum_of_squares
}

/// Reset, associate and weigh a single particle. Returns its unnormalized weight.
fn weigh_particle(
    particle: &mut Particle,
    observations: &[Observation],
    map: &Map,
    landmark_std: &LandmarkNoise,
    gate: Option<f64>,
) -> Result<f64> {
    let mut weight = 1.0;
    let mut associations = Vec::with_capacity(observations.len());
    let mut sense_x = Vec::with_capacity(observations.len());
    let mut sense_y = Vec::with_capacity(observations.len());
    for observation in observations {
        let mapped = particle.to_map_frame(observation);
        let landmark = match gate {
            Some(range) => map.nearest_within_range(
                mapped.x,
                mapped.y,
                particle.pose.x,
                particle.pose.y,
                range,
            )?,
            None => map.nearest(mapped.x, mapped.y)?,
        };
        weight *= landmark_likelihood(landmark_std, mapped.x, mapped.y, landmark.x, landmark.y);
        associations.push(landmark.id);
        sense_x.push(mapped.x);
        sense_y.push(mapped.y);
    }
    particle.weight = weight;
    particle.set_associations(associations, sense_x, sense_y);
    Ok(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Landmark;
    use crate::resampling::ParticleResamplingStrategy;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    fn small_config(n: usize) -> FilterConfig {
        FilterConfig {
            num_particles: n,
            ..FilterConfig::default()
        }
    }

    fn scenario_filter() -> ParticleFilter {
        let particles = vec![
            Particle::new(0, Pose::new(10.0, 10.0, 0.0), 1.0),
            Particle::new(1, Pose::new(10.0, 11.0, 0.1), 1.0),
            Particle::new(2, Pose::new(11.0, 10.0, -0.1), 1.0),
        ];
        ParticleFilter::from_particles(
            FilterConfig::default(),
            particles,
            StdRng::seed_from_u64(1),
        )
        .unwrap()
    }

    #[test]
    fn test_init_population() {
        let mut pf = ParticleFilter::new(small_config(250)).unwrap();
        assert!(!pf.is_initialized());
        pf.init(Pose::new(4.0, -2.0, 1.0)).unwrap();
        assert!(pf.is_initialized());
        assert_eq!(pf.particles().len(), 250);
        assert_eq!(pf.weights().len(), 250);
        for (i, particle) in pf.particles().iter().enumerate() {
            assert_eq!(particle.id, i);
            assert_eq!(particle.weight, 1.0);
            assert_eq!(pf.weights()[i], 1.0);
        }
    }

    #[test]
    fn test_init_sample_mean_converges() {
        let mut pf = ParticleFilter::new_with_seed(small_config(20_000), 17).unwrap();
        pf.init_with_std(Pose::new(6.0, 3.0, 0.5), &PoseNoise::new(2.0, 1.0, 0.05))
            .unwrap();
        let n = pf.particles().len() as f64;
        let mean_x = pf.particles().iter().map(|p| p.pose.x).sum::<f64>() / n;
        let mean_y = pf.particles().iter().map(|p| p.pose.y).sum::<f64>() / n;
        let mean_theta = pf.particles().iter().map(|p| p.pose.theta).sum::<f64>() / n;
        assert_approx_eq!(mean_x, 6.0, 0.05);
        assert_approx_eq!(mean_y, 3.0, 0.025);
        assert_approx_eq!(mean_theta, 0.5, 0.002);
    }

    #[test]
    fn test_init_heading_in_range() {
        let mut pf = ParticleFilter::new(small_config(2_000)).unwrap();
        pf.init_with_std(Pose::new(0.0, 0.0, PI), &PoseNoise::new(1.0, 1.0, 2.0))
            .unwrap();
        assert!(
            pf.particles()
                .iter()
                .all(|p| p.pose.theta > -PI && p.pose.theta <= PI)
        );
    }

    #[test]
    fn test_init_twice_fails() {
        let mut pf = ParticleFilter::new(small_config(10)).unwrap();
        pf.init(Pose::default()).unwrap();
        assert!(matches!(
            pf.init(Pose::default()),
            Err(FilterError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_operations_before_init_fail() {
        let map = Map::new(vec![Landmark::new(1, 0.0, 0.0)]);
        let mut pf = ParticleFilter::new(small_config(10)).unwrap();
        assert!(matches!(
            pf.predict(0.1, &Control::new(1.0, 0.0)),
            Err(FilterError::NotInitialized)
        ));
        assert!(matches!(
            pf.update_weights(&[Observation::new(1.0, 1.0)], &map),
            Err(FilterError::NotInitialized)
        ));
        assert!(matches!(pf.resample(), Err(FilterError::NotInitialized)));
        assert!(matches!(pf.estimate(), Err(FilterError::NotInitialized)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(ParticleFilter::new(small_config(0)).is_err());
        let mut pf = ParticleFilter::new(small_config(10)).unwrap();
        pf.init(Pose::default()).unwrap();
        assert!(matches!(
            pf.predict(0.0, &Control::new(1.0, 0.0)),
            Err(FilterError::InvalidConfig(_))
        ));
        assert!(matches!(
            pf.predict_with_noise(0.1, &PoseNoise::new(0.1, 0.0, 0.1), &Control::default()),
            Err(FilterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_predict_moves_population() {
        let mut pf = ParticleFilter::new(small_config(1_000)).unwrap();
        pf.init_with_std(Pose::new(0.0, 0.0, 0.0), &PoseNoise::new(0.01, 0.01, 0.001))
            .unwrap();
        pf.predict_with_noise(1.0, &PoseNoise::new(0.01, 0.01, 0.001), &Control::new(5.0, 0.0))
            .unwrap();
        let n = pf.particles().len() as f64;
        let mean_x = pf.particles().iter().map(|p| p.pose.x).sum::<f64>() / n;
        let mean_y = pf.particles().iter().map(|p| p.pose.y).sum::<f64>() / n;
        assert_approx_eq!(mean_x, 5.0, 0.01);
        assert_approx_eq!(mean_y, 0.0, 0.01);
        assert!(
            pf.particles()
                .iter()
                .all(|p| p.pose.theta > -PI && p.pose.theta <= PI)
        );
    }

    #[test]
    fn test_end_to_end_three_particles() {
        let mut pf = scenario_filter();
        let map = Map::new(vec![Landmark::new(1, 15.0, 15.0)]);
        let observations = [Observation::new(5.0, 5.0)];
        pf.update_weights(&observations, &map).unwrap();

        let p = pf.particles();
        assert_approx_eq!(p[0].sense_x[0], 15.0, 1e-12);
        assert_approx_eq!(p[0].sense_y[0], 15.0, 1e-12);
        let (s, c) = 0.1_f64.sin_cos();
        assert_approx_eq!(p[1].sense_x[0], 5.0 * c - 5.0 * s + 10.0, 1e-12);
        assert_approx_eq!(p[1].sense_y[0], 5.0 * s + 5.0 * c + 11.0, 1e-12);
        assert_approx_eq!(p[1].sense_x[0], 14.4758537432, 1e-8);
        assert_approx_eq!(p[1].sense_y[0], 16.4741879096, 1e-8);
        assert_approx_eq!(p[2].sense_x[0], 16.4741879096, 1e-8);
        assert_approx_eq!(p[2].sense_y[0], 14.4758537432, 1e-8);
        assert!(p.iter().all(|particle| particle.associations == vec![1]));

        // closer predicted observation -> higher weight; particles 1 and 2 are mirror images
        assert!(p[0].weight > p[1].weight);
        assert_approx_eq!(p[1].weight, p[2].weight, 1e-15);

        let noise = LandmarkNoise::default();
        let raw: Vec<f64> = p
            .iter()
            .map(|particle| {
                landmark_likelihood(&noise, particle.sense_x[0], particle.sense_y[0], 15.0, 15.0)
            })
            .collect();
        let total: f64 = raw.iter().sum();
        for (particle, r) in p.iter().zip(&raw) {
            assert_approx_eq!(particle.weight, r / total, 1e-12);
        }
        assert_eq!(pf.weights(), &[p[0].weight, p[1].weight, p[2].weight]);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let map = Map::new(vec![
            Landmark::new(1, 5.0, 3.0),
            Landmark::new(2, 2.0, 1.0),
            Landmark::new(3, 6.0, 1.0),
            Landmark::new(4, 7.0, 4.0),
        ]);
        let observations = [
            Observation::new(2.0, 2.0),
            Observation::new(3.0, -2.0),
            Observation::new(0.0, -4.0),
        ];
        let mut pf = ParticleFilter::new(FilterConfig {
            num_particles: 500,
            position_std: PoseNoise::new(0.5, 0.5, 0.05),
            landmark_std: LandmarkNoise::new(1.0, 1.0),
            ..FilterConfig::default()
        })
        .unwrap();
        pf.init(Pose::new(4.0, 5.0, -PI / 2.0)).unwrap();
        pf.update_weights(&observations, &map).unwrap();
        let sum: f64 = pf.weights().iter().sum();
        assert_approx_eq!(sum, 1.0, 1e-9);
        for particle in pf.particles() {
            assert_eq!(particle.associations.len(), 3);
            assert_eq!(particle.sense_x.len(), 3);
            assert_eq!(particle.sense_y.len(), 3);
        }
        // overwritten, not appended
        pf.update_weights(&observations[..1], &map).unwrap();
        assert!(pf.particles().iter().all(|p| p.associations.len() == 1));
    }

    #[test]
    fn test_no_observations_gives_uniform_weights() {
        let mut pf = ParticleFilter::new(small_config(4)).unwrap();
        pf.init(Pose::default()).unwrap();
        pf.update_weights(&[], &Map::default()).unwrap();
        for w in pf.weights() {
            assert_approx_eq!(*w, 0.25, 1e-15);
        }
        assert!(pf.particles().iter().all(|p| p.associations.is_empty()));
    }

    #[test]
    fn test_empty_map_fails() {
        let mut pf = ParticleFilter::new(small_config(4)).unwrap();
        pf.init(Pose::default()).unwrap();
        assert!(matches!(
            pf.update_weights(&[Observation::new(1.0, 0.0)], &Map::default()),
            Err(FilterError::EmptyMap)
        ));
    }

    #[test]
    fn test_degenerate_weights_fail() {
        let mut pf = ParticleFilter::new(small_config(20)).unwrap();
        pf.init(Pose::default()).unwrap();
        let map = Map::new(vec![Landmark::new(1, 1000.0, 1000.0)]);
        let result = pf.update_weights(&[Observation::new(0.0, 0.0)], &map);
        assert!(matches!(result, Err(FilterError::DegenerateWeights { sum }) if sum == 0.0));
        assert!(pf.weights().iter().all(|w| !w.is_nan()));
    }

    #[test]
    fn test_degenerate_pass_blocks_resampling() {
        let mut pf = scenario_filter();
        let near = Map::new(vec![Landmark::new(1, 15.0, 15.0)]);
        pf.update_weights(&[Observation::new(5.0, 5.0)], &near).unwrap();
        assert_approx_eq!(pf.weights().iter().sum::<f64>(), 1.0, 1e-9);

        let far = Map::new(vec![Landmark::new(2, 1000.0, 1000.0)]);
        assert!(matches!(
            pf.update_weights(&[Observation::new(0.0, 0.0)], &far),
            Err(FilterError::DegenerateWeights { .. })
        ));
        for (particle, weight) in pf.particles().iter().zip(pf.weights()) {
            assert_eq!(particle.weight, *weight);
        }
        assert!(matches!(
            pf.resample(),
            Err(FilterError::DegenerateWeights { .. })
        ));

        // a good pass restores the population
        pf.update_weights(&[Observation::new(5.0, 5.0)], &near).unwrap();
        assert!(pf.resample().is_ok());
    }

    #[test]
    fn test_from_particles_rejects_invalid_weights() {
        for weights in [[0.5, -0.1], [f64::NAN, 1.0], [f64::INFINITY, 1.0], [0.0, 0.0]] {
            let particles: Vec<Particle> = weights
                .iter()
                .enumerate()
                .map(|(i, &w)| Particle::new(i, Pose::default(), w))
                .collect();
            assert!(
                matches!(
                    ParticleFilter::from_particles(
                        FilterConfig::default(),
                        particles,
                        StdRng::seed_from_u64(0)
                    ),
                    Err(FilterError::InvalidConfig(_))
                ),
                "{weights:?}"
            );
        }
        assert!(matches!(
            ParticleFilter::from_particles(FilterConfig::default(), Vec::new(), StdRng::seed_from_u64(0)),
            Err(FilterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_resample_keeps_size_and_reassigns_ids() {
        let mut pf = scenario_filter();
        let map = Map::new(vec![Landmark::new(1, 15.0, 15.0)]);
        pf.update_weights(&[Observation::new(5.0, 5.0)], &map).unwrap();
        pf.resample().unwrap();
        assert_eq!(pf.particles().len(), 3);
        for (i, particle) in pf.particles().iter().enumerate() {
            assert_eq!(particle.id, i);
            assert_eq!(pf.weights()[i], particle.weight);
            assert!(particle.pose.theta > -PI && particle.pose.theta <= PI);
        }
        // particle 0 carries virtually all the weight
        assert!(
            pf.particles()
                .iter()
                .all(|p| p.pose == Pose::new(10.0, 10.0, 0.0))
        );
    }

    #[test]
    fn test_resample_frequencies_follow_weights() {
        let particles: Vec<Particle> = [0.7, 0.2, 0.1]
            .iter()
            .enumerate()
            .map(|(i, &w)| Particle::new(i, Pose::new(i as f64, 0.0, 0.0), w))
            .collect();
        let mut counts = [0usize; 3];
        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..5_000 {
            let mut pf = ParticleFilter::from_particles(
                FilterConfig::default(),
                particles.clone(),
                StdRng::seed_from_u64(rng.random()),
            )
            .unwrap();
            pf.resample().unwrap();
            for particle in pf.particles() {
                counts[particle.pose.x as usize] += 1;
            }
        }
        let total = counts.iter().sum::<usize>() as f64;
        assert_approx_eq!(counts[0] as f64 / total, 0.7, 0.015);
        assert_approx_eq!(counts[1] as f64 / total, 0.2, 0.015);
        assert_approx_eq!(counts[2] as f64 / total, 0.1, 0.015);
    }

    #[test]
    fn test_same_seed_same_run() {
        let map = Map::new(vec![Landmark::new(1, 5.0, 3.0), Landmark::new(2, 2.0, 1.0)]);
        let observations = [Observation::new(3.0, 1.0)];
        for parallel in [false, true] {
            let run = || {
                let config = FilterConfig {
                    num_particles: 64,
                    parallel,
                    ..FilterConfig::default()
                };
                let mut pf = ParticleFilter::new_with_seed(config, 99).unwrap();
                pf.init(Pose::new(1.0, 1.0, 0.2)).unwrap();
                for _ in 0..5 {
                    pf.step(0.1, &Control::new(2.0, 0.1), &observations, &map)
                        .unwrap();
                }
                pf.particles().to_vec()
            };
            assert_eq!(run(), run());
        }
    }

    #[test]
    fn test_parallel_weights_normalized() {
        let map = Map::new(vec![Landmark::new(1, 5.0, 3.0), Landmark::new(2, 2.0, 1.0)]);
        let mut pf = ParticleFilter::new(FilterConfig {
            num_particles: 300,
            parallel: true,
            ..FilterConfig::default()
        })
        .unwrap();
        pf.init(Pose::new(1.0, 1.0, 0.0)).unwrap();
        pf.predict(0.1, &Control::new(1.0, 0.3)).unwrap();
        pf.update_weights(&[Observation::new(1.0, 0.0)], &map).unwrap();
        assert_approx_eq!(pf.weights().iter().sum::<f64>(), 1.0, 1e-9);
    }

    #[test]
    fn test_range_gated_weighting() {
        let map = Map::new(vec![
            Landmark::new(1, 100.0, 0.0),
            Landmark::new(2, 20.0, 0.0),
        ]);
        let particles = vec![Particle::new(0, Pose::new(0.0, 0.0, 0.0), 1.0)];
        let config = FilterConfig {
            range_gated_association: true,
            landmark_std: LandmarkNoise::new(50.0, 50.0),
            ..FilterConfig::default()
        };
        let mut pf =
            ParticleFilter::from_particles(config, particles, StdRng::seed_from_u64(0)).unwrap();
        pf.update_weights(&[Observation::new(90.0, 0.0)], &map).unwrap();
        assert_eq!(pf.particles()[0].associations, vec![2]);
    }

    #[test]
    fn test_alternative_resampling_strategy() {
        let config = FilterConfig {
            num_particles: 100,
            resampling_strategy: ParticleResamplingStrategy::Systematic,
            ..FilterConfig::default()
        };
        let mut pf = ParticleFilter::new(config).unwrap();
        pf.init(Pose::default()).unwrap();
        pf.resample().unwrap();
        assert_eq!(pf.particles().len(), 100);
        assert_approx_eq!(pf.effective_sample_size().unwrap(), 100.0, 1e-9);
    }
}
