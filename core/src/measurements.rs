//! Landmark measurement model
//!
//! The sensor model treats a map-frame observation as a sample from a bivariate Gaussian centred on the
//! associated landmark with diagonal covariance $\mathrm{diag}(\sigma_x^2, \sigma_y^2)$:
//!
//! $$
//! p(z \mid m) = \frac{1}{2 \pi \sigma_x \sigma_y} \exp\left(-\left(\frac{(z_x - m_x)^2}{2 \sigma_x^2} + \frac{(z_y - m_y)^2}{2 \sigma_y^2}\right)\right)
//! $$
//!
//! Particle weights are the product of this density over every observation of a cycle.
use std::f64::consts::PI;

use crate::config::LandmarkNoise;

/// Bivariate Gaussian density of a map-frame observation given the associated landmark as the mean.
///
/// # Arguments
/// * `noise` - Landmark measurement standard deviations.
/// * `observed_x`, `observed_y` - Observation in the map frame.
/// * `landmark_x`, `landmark_y` - Associated landmark position (the mean).
pub fn landmark_likelihood(
    noise: &LandmarkNoise,
    observed_x: f64,
    observed_y: f64,
    landmark_x: f64,
    landmark_y: f64,
) -> f64 {
    let normalizer = 1.0 / (2.0 * PI * noise.x * noise.y);
    let dx = observed_x - landmark_x;
    let dy = observed_y - landmark_y;
    let exponent = dx * dx / (2.0 * noise.x * noise.x) + dy * dy / (2.0 * noise.y * noise.y);
    normalizer * (-exponent).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_peak_density() {
        let noise = LandmarkNoise::new(0.3, 0.3);
        let peak = landmark_likelihood(&noise, 5.0, 5.0, 5.0, 5.0);
        assert_approx_eq!(peak, 1.0 / (2.0 * PI * 0.09), 1e-12);
    }

    #[test]
    fn test_known_value() {
        // dx = 0.3 (one sigma in x), dy = 0 -> exp(-0.5)
        let noise = LandmarkNoise::new(0.3, 0.5);
        let value = landmark_likelihood(&noise, 1.3, 2.0, 1.0, 2.0);
        assert_approx_eq!(value, (-0.5_f64).exp() / (2.0 * PI * 0.15), 1e-12);
    }

    #[test]
    fn test_density_decreases_with_distance() {
        let noise = LandmarkNoise::default();
        let near = landmark_likelihood(&noise, 0.1, 0.0, 0.0, 0.0);
        let far = landmark_likelihood(&noise, 1.0, 0.0, 0.0, 0.0);
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn test_density_underflows_to_zero_far_away() {
        let noise = LandmarkNoise::default();
        assert_eq!(landmark_likelihood(&noise, 1000.0, 0.0, 0.0, 0.0), 0.0);
    }
}
