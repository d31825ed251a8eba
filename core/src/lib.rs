//! Landmark particle filter toolbox for planar vehicle localization
//!
//! This crate provides a Monte Carlo localization filter for a vehicle moving in the plane. Given a noisy
//! initial pose, a velocity/yaw-rate motion model and range/bearing style landmark observations expressed
//! in the vehicle frame, the filter maintains a weighted population of pose hypotheses ("particles") that
//! converges to the vehicle's true position and heading. The map of landmarks is fixed and known ahead of
//! time; this crate does not perform SLAM.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the rotations and small matrices used for frame transforms and covariances.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides the random number generation for process noise and resampling.
//! - [`rayon`](https://crates.io/crates/rayon): Provides optional data parallelism for the per-particle loops.
//!
//! All other functionality is built on top of these crates or is auxiliary functionality (e.g. I/O).
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [config]: Filter configuration, validation and file (JSON/YAML/TOML) round-tripping.
//! - [error]: The error type shared by every fallible operation in the crate.
//! - [filter]: The particle filter itself: initialization, prediction, weighting and resampling.
//! - [map]: Landmarks, observations and nearest-neighbour data association.
//! - [measurements]: The bivariate Gaussian landmark sensor model.
//! - [motion]: The velocity/yaw-rate (bicycle) motion model and its process noise.
//! - [particle]: The particle record, frame transforms and association diagnostics.
//! - [resampling]: Index-returning resampling schemes.
//! - [sim]: CSV data loading, synthetic scenarios and the driver loop that runs the filter over a dataset.
//!
//! ## Coordinate and state definitions
//!
//! The state of each particle is the planar pose
//!
//! $$
//! x = [p_x, p_y, \theta]
//! $$
//!
//! where $p_x$ and $p_y$ are map-frame coordinates (meters) and $\theta$ is the heading (radians) measured
//! counter-clockwise from the map x-axis. Heading is always kept in the canonical range $(-\pi, \pi]$ by
//! [normalize_angle].
//!
//! Observations arrive in the vehicle frame: x forward, y to the left. A vehicle-frame point $(o_x, o_y)$
//! seen from pose $(p_x, p_y, \theta)$ lies at the map-frame point
//!
//! $$
//! m_x = \cos\theta \, o_x - \sin\theta \, o_y + p_x, \qquad m_y = \sin\theta \, o_x + \cos\theta \, o_y + p_y
//! $$
//!
//! ## Filter cycle
//!
//! Once per timestep the caller runs prediction, weighting and resampling in that order:
//!
//! ```rust
//! use localization::config::FilterConfig;
//! use localization::filter::ParticleFilter;
//! use localization::map::{Landmark, Map, Observation};
//! use localization::motion::Control;
//! use localization::Pose;
//!
//! let config = FilterConfig::default();
//! let map = Map::new(vec![Landmark::new(1, 5.0, 3.0), Landmark::new(2, 2.0, 1.0)]);
//! let mut pf = ParticleFilter::new(config.clone()).unwrap();
//! pf.init(Pose::new(0.0, 0.0, 0.0)).unwrap();
//!
//! pf.predict(config.delta_t, &Control::new(1.0, 0.1)).unwrap();
//! pf.update_weights(&[Observation::new(5.0, 3.0)], &map).unwrap();
//! pf.resample().unwrap();
//! let estimate = pf.estimate().unwrap();
//! assert!(estimate.x.is_finite());
//! ```
pub mod config;
pub mod error;
pub mod filter;
pub mod map;
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod resampling;
pub mod sim;

use std::f64::consts::PI;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub use error::{FilterError, Result};

/// Planar vehicle pose in the map frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Map-frame x coordinate (m)
    pub x: f64,
    /// Map-frame y coordinate (m)
    pub y: f64,
    /// Heading (rad) in the range (-π, π]
    pub theta: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose(x: {:.4}, y: {:.4}, theta: {:.4})",
            self.x, self.y, self.theta
        )
    }
}
impl Pose {
    /// Create a new pose, normalizing the heading into (-π, π].
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }
    /// Euclidean distance between the positions of two poses
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Wrap an angle into the half-open range $(-\pi, \pi]$ radians
///
/// Unlike a simple loop-based wrap, this uses the Euclidean remainder so that arbitrarily large angles
/// are wrapped in constant time. Angles already in range and non-finite inputs are returned unchanged.
///
/// # Arguments
/// * `angle` - The angle to be wrapped in radians.
/// # Returns
/// * The wrapped angle, which will be greater than -π and at most π.
/// # Example
/// ```rust
/// use localization::normalize_angle;
/// use std::f64::consts::PI;
/// let wrapped = normalize_angle(3.0 * PI / 2.0);
/// assert!((wrapped + PI / 2.0).abs() < 1e-12);
/// assert_eq!(normalize_angle(-PI), PI);
/// ```
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() || (angle > -PI && angle <= PI) {
        return angle;
    }
    let mut wrapped = PI - (PI - angle).rem_euclid(2.0 * PI);
    if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}
