//! Velocity/yaw-rate motion model
//!
//! Particles are advanced with the classic bicycle (unicycle) model driven by a commanded speed $v$ and
//! yaw rate $\dot\psi$. For a non-zero yaw rate the closed-form arc integral is used:
//!
//! $$
//! x(+) = x(-) + \frac{v}{\dot\psi}\left(\sin(\theta + \dot\psi \Delta t) - \sin\theta\right), \qquad
//! y(+) = y(-) + \frac{v}{\dot\psi}\left(\cos\theta - \cos(\theta + \dot\psi \Delta t)\right), \qquad
//! \theta(+) = \theta + \dot\psi \Delta t
//! $$
//!
//! and for a (numerically) zero yaw rate the straight-line limit $x(+) = x + v \cos\theta \, \Delta t$,
//! $y(+) = y + v \sin\theta \, \Delta t$.
//!
//! Process noise is zero-mean Gaussian noise added directly to $x$, $y$ and $\theta$ before the
//! deterministic update, representing control uncertainty.
use std::fmt::{self, Display};

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::config::PoseNoise;
use crate::error::{FilterError, Result};
use crate::{Pose, normalize_angle};

/// Yaw rates with a magnitude below this threshold use the straight-line model (rad/s)
pub const YAW_RATE_EPSILON: f64 = 1e-6;

/// Commanded control input for one filter cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Forward speed (m/s)
    pub velocity: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
}
impl Control {
    pub fn new(velocity: f64, yaw_rate: f64) -> Self {
        Control { velocity, yaw_rate }
    }
}
impl Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Control(velocity: {}, yaw_rate: {})",
            self.velocity, self.yaw_rate
        )
    }
}

/// Apply the deterministic motion update to a pose.
///
/// The returned heading is normalized into (-π, π].
pub fn move_pose(pose: &Pose, control: &Control, dt: f64) -> Pose {
    let theta = pose.theta;
    if control.yaw_rate.abs() > YAW_RATE_EPSILON {
        let radius = control.velocity / control.yaw_rate;
        let new_theta = theta + control.yaw_rate * dt;
        Pose {
            x: pose.x + radius * (new_theta.sin() - theta.sin()),
            y: pose.y + radius * (theta.cos() - new_theta.cos()),
            theta: normalize_angle(new_theta),
        }
    } else {
        Pose {
            x: pose.x + control.velocity * theta.cos() * dt,
            y: pose.y + control.velocity * theta.sin() * dt,
            theta: normalize_angle(theta),
        }
    }
}

/// Independent zero-mean Gaussian noise on each pose axis
#[derive(Clone, Copy, Debug)]
pub struct ProcessNoise {
    x: Normal<f64>,
    y: Normal<f64>,
    theta: Normal<f64>,
}

impl ProcessNoise {
    /// Build the per-axis distributions from standard deviations.
    ///
    /// # Errors
    /// [FilterError::InvalidConfig] if any standard deviation is not strictly positive.
    pub fn new(std: &PoseNoise) -> Result<Self> {
        std.validate("process noise")?;
        Ok(ProcessNoise {
            x: normal(0.0, std.x)?,
            y: normal(0.0, std.y)?,
            theta: normal(0.0, std.theta)?,
        })
    }
    /// Add one independent noise draw to each axis of the pose (heading is not renormalized).
    pub fn perturb<R: Rng + ?Sized>(&self, pose: &mut Pose, rng: &mut R) {
        pose.x += self.x.sample(rng);
        pose.y += self.y.sample(rng);
        pose.theta += self.theta.sample(rng);
    }
}

/// Propagate a particle pose: perturb with process noise, then apply the motion update.
pub fn propagate<R: Rng + ?Sized>(
    pose: &Pose,
    control: &Control,
    dt: f64,
    noise: &ProcessNoise,
    rng: &mut R,
) -> Pose {
    let mut noisy = *pose;
    noise.perturb(&mut noisy, rng);
    move_pose(&noisy, control, dt)
}

pub(crate) fn normal(mean: f64, std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| {
        FilterError::InvalidConfig(format!(
            "cannot build normal distribution with std {std_dev}: {e}"
        ))
    })
}
