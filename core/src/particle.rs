//! Particle records, frame transforms and population estimates
//!
//! A [Particle] is a self-contained value: a pose hypothesis, its importance weight and the association
//! diagnostics recorded during the most recent weighting pass. Particles never reference each other or the
//! map, so duplicating one during resampling is a plain clone.
use std::fmt::{self, Display};

use nalgebra::{Matrix3, Rotation2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::map::Observation;
use crate::{Pose, normalize_angle};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    /// Index of the particle within the current population
    pub id: usize,
    pub pose: Pose,
    pub weight: f64,
    /// Landmark identifier matched to each observation of the last weighting pass
    pub associations: Vec<u32>,
    /// Map-frame x coordinate of each observation of the last weighting pass
    pub sense_x: Vec<f64>,
    /// Map-frame y coordinate of each observation of the last weighting pass
    pub sense_y: Vec<f64>,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("theta", &self.pose.theta)
            .field("weight", &self.weight)
            .field("associations", &self.associations.len())
            .finish()
    }
}

/// Axis selector for [Particle::sense_coord_string]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenseAxis {
    X,
    Y,
}

impl Particle {
    pub fn new(id: usize, pose: Pose, weight: f64) -> Particle {
        Particle {
            id,
            pose,
            weight,
            associations: Vec::new(),
            sense_x: Vec::new(),
            sense_y: Vec::new(),
        }
    }

    /// Transform a vehicle-frame observation into the map frame as seen from this particle.
    ///
    /// The returned observation keeps the identifier of the input.
    pub fn to_map_frame(&self, observation: &Observation) -> Observation {
        transform_to_map(&self.pose, observation)
    }

    /// Replace the association diagnostics of the particle.
    ///
    /// # Panics
    /// If the three sequences do not have equal length.
    pub fn set_associations(&mut self, associations: Vec<u32>, sense_x: Vec<f64>, sense_y: Vec<f64>) {
        assert!(
            associations.len() == sense_x.len() && sense_x.len() == sense_y.len(),
            "associations, sense_x and sense_y must have equal length"
        );
        self.associations = associations;
        self.sense_x = sense_x;
        self.sense_y = sense_y;
    }

    /// Associated landmark identifiers as a space-separated list
    pub fn associations_string(&self) -> String {
        join_space(self.associations.iter())
    }

    /// Map-frame observation coordinates along one axis as a space-separated list
    pub fn sense_coord_string(&self, axis: SenseAxis) -> String {
        match axis {
            SenseAxis::X => join_space(self.sense_x.iter()),
            SenseAxis::Y => join_space(self.sense_y.iter()),
        }
    }
}

fn join_space<T: Display>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rigid-body transform of a vehicle-frame point into the map frame.
///
/// Rotates by the pose heading and translates by the pose position:
/// `mx = cos(θ)·ox − sin(θ)·oy + x`, `my = sin(θ)·ox + cos(θ)·oy + y`.
pub fn transform_to_map(pose: &Pose, observation: &Observation) -> Observation {
    let rotated = Rotation2::new(pose.theta) * Vector2::new(observation.x, observation.y);
    let mapped = rotated + Vector2::new(pose.x, pose.y);
    Observation {
        id: observation.id,
        x: mapped.x,
        y: mapped.y,
    }
}

/// Pose estimate derived from a particle population
#[derive(Clone, Debug, PartialEq)]
pub struct PoseEstimate {
    pub pose: Pose,
    /// Covariance of (x, y, theta); zero for single-particle estimates
    pub covariance: Matrix3<f64>,
}

/// How a single pose estimate is extracted from the population
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleAveragingStrategy {
    WeightedAverage,
    UnweightedAverage,
    #[default]
    HighestWeight,
}

impl ParticleAveragingStrategy {
    /// Compute the estimate for a non-empty population. Returns `None` if `particles` is empty.
    pub fn estimate(&self, particles: &[Particle]) -> Option<PoseEstimate> {
        if particles.is_empty() {
            return None;
        }
        match self {
            ParticleAveragingStrategy::WeightedAverage => {
                let weights: Vec<f64> = particles.iter().map(|p| p.weight).collect();
                Some(Self::mean_state(particles, &weights))
            }
            ParticleAveragingStrategy::UnweightedAverage => {
                let weights = vec![1.0; particles.len()];
                Some(Self::mean_state(particles, &weights))
            }
            ParticleAveragingStrategy::HighestWeight => {
                best_particle(particles).map(|best| PoseEstimate {
                    pose: best.pose,
                    covariance: Matrix3::zeros(),
                })
            }
        }
    }

    /// Mean and covariance under the given (unnormalized) weights; heading uses the circular mean.
    fn mean_state(particles: &[Particle], weights: &[f64]) -> PoseEstimate {
        let norm: f64 = weights.iter().sum();
        if !(norm > 0.0 && norm.is_finite()) {
            // fall back to an unweighted mean
            return Self::mean_state(particles, &vec![1.0; particles.len()]);
        }
        let (mut x, mut y, mut sin_sum, mut cos_sum) = (0.0, 0.0, 0.0, 0.0);
        for (particle, w) in particles.iter().zip(weights) {
            let w = w / norm;
            x += w * particle.pose.x;
            y += w * particle.pose.y;
            sin_sum += w * particle.pose.theta.sin();
            cos_sum += w * particle.pose.theta.cos();
        }
        let mean = Pose::new(x, y, sin_sum.atan2(cos_sum));
        let mut covariance = Matrix3::<f64>::zeros();
        for (particle, w) in particles.iter().zip(weights) {
            let diff = Vector3::new(
                particle.pose.x - mean.x,
                particle.pose.y - mean.y,
                normalize_angle(particle.pose.theta - mean.theta),
            );
            covariance += (w / norm) * diff * diff.transpose();
        }
        PoseEstimate {
            pose: mean,
            covariance,
        }
    }
}

/// The particle with the highest weight; ties resolve to the first such particle.
pub fn best_particle(particles: &[Particle]) -> Option<&Particle> {
    let mut best: Option<&Particle> = None;
    for particle in particles {
        match best {
            Some(b) if particle.weight <= b.weight => {}
            _ => best = Some(particle),
        }
    }
    best
}
