//! Dataset loading, synthetic scenarios and the localization driver loop.
//!
//! This module provides:
//! - CSV loaders for the landmark map, the control log, the ground-truth trajectory and the per-timestep
//!   observation files, bundled together as a [Dataset]
//! - [Scenario] for generating a reproducible synthetic [Dataset] from a seed
//! - [run_localization], which runs the particle filter over a [Dataset] and collects a
//!   [LocalizationResult]
//! - CSV export and import of [LocalizationResult]
//!
//! A dataset directory has the following layout:
//!
//! ```text
//! <dir>/map.csv                                 x,y,id
//! <dir>/controls.csv                            velocity,yaw_rate
//! <dir>/ground_truth.csv                        x,y,theta
//! <dir>/observations/observations_000001.csv    x,y   (one file per timestep, 1-based)
//! ```
use std::fs;
use std::path::Path;

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand_distr::Distribution;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{FilterConfig, LandmarkNoise, PoseNoise};
use crate::error::{FilterError, Result};
use crate::filter::ParticleFilter;
use crate::map::{Landmark, Map, Observation};
use crate::motion::{Control, ProcessNoise, move_pose, normal};
use crate::particle::{ParticleAveragingStrategy, SenseAxis};
use crate::{Pose, normalize_angle};

pub const MAP_FILE: &str = "map.csv";
pub const CONTROLS_FILE: &str = "controls.csv";
pub const GROUND_TRUTH_FILE: &str = "ground_truth.csv";
pub const OBSERVATIONS_DIR: &str = "observations";

/// File name of the observations recorded at a zero-based timestep.
///
/// ```
/// use localization::sim::observation_file_name;
/// assert_eq!(observation_file_name(0), "observations_000001.csv");
/// ```
pub fn observation_file_name(step: usize) -> String {
    format!("observations_{:06}.csv", step + 1)
}

/// Row of an observation file. Observations on disk carry no landmark identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ObservationRecord {
    x: f64,
    y: f64,
}

fn read_csv<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

fn write_csv<T: Serialize, P: AsRef<Path>>(records: &[T], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a landmark map with `x,y,id` columns.
pub fn load_map<P: AsRef<Path>>(path: P) -> Result<Map> {
    let landmarks: Vec<Landmark> = read_csv(path)?;
    Ok(Map::new(landmarks))
}

/// Read a control log with `velocity,yaw_rate` columns.
pub fn load_controls<P: AsRef<Path>>(path: P) -> Result<Vec<Control>> {
    read_csv(path)
}

/// Read a ground-truth trajectory with `x,y,theta` columns. Headings are normalized on load.
pub fn load_ground_truth<P: AsRef<Path>>(path: P) -> Result<Vec<Pose>> {
    let poses: Vec<Pose> = read_csv(path)?;
    Ok(poses
        .into_iter()
        .map(|p| Pose::new(p.x, p.y, p.theta))
        .collect())
}

/// Read one timestep of vehicle-frame observations with `x,y` columns.
pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>> {
    let records: Vec<ObservationRecord> = read_csv(path)?;
    Ok(records
        .into_iter()
        .map(|r| Observation::new(r.x, r.y))
        .collect())
}

/// Everything needed to run the filter over a recorded or simulated drive
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub map: Map,
    /// Control applied between step `k` and step `k + 1`
    pub controls: Vec<Control>,
    pub ground_truth: Vec<Pose>,
    /// Vehicle-frame observations for each step
    pub observations: Vec<Vec<Observation>>,
}

impl Dataset {
    /// Number of timesteps (one per ground-truth pose)
    pub fn steps(&self) -> usize {
        self.ground_truth.len()
    }

    /// Check that the pieces of the dataset line up.
    ///
    /// # Errors
    /// [FilterError::Format] if there is no ground truth, the observation count differs from the
    /// ground-truth count, or there are fewer than `steps - 1` controls.
    pub fn validate(&self) -> Result<()> {
        let steps = self.steps();
        if steps == 0 {
            return Err(FilterError::Format(
                "dataset has no ground-truth poses".to_string(),
            ));
        }
        if self.observations.len() != steps {
            return Err(FilterError::Format(format!(
                "dataset has {} observation sets for {} steps",
                self.observations.len(),
                steps
            )));
        }
        if self.controls.len() + 1 < steps {
            return Err(FilterError::Format(format!(
                "dataset has {} controls for {} steps",
                self.controls.len(),
                steps
            )));
        }
        Ok(())
    }

    /// Load a dataset directory. One observation file is read per ground-truth pose.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let map = load_map(dir.join(MAP_FILE))?;
        let controls = load_controls(dir.join(CONTROLS_FILE))?;
        let ground_truth = load_ground_truth(dir.join(GROUND_TRUTH_FILE))?;
        let observations = (0..ground_truth.len())
            .map(|step| {
                load_observations(dir.join(OBSERVATIONS_DIR).join(observation_file_name(step)))
            })
            .collect::<Result<Vec<_>>>()?;
        let dataset = Dataset {
            map,
            controls,
            ground_truth,
            observations,
        };
        dataset.validate()?;
        info!(
            "Loaded dataset from {}: {} landmarks, {} steps",
            dir.display(),
            dataset.map.len(),
            dataset.steps()
        );
        Ok(dataset)
    }

    /// Write the dataset in the directory layout read by [Dataset::from_dir].
    pub fn to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let observations_dir = dir.join(OBSERVATIONS_DIR);
        fs::create_dir_all(&observations_dir)?;
        write_csv(self.map.landmarks(), dir.join(MAP_FILE))?;
        write_csv(&self.controls, dir.join(CONTROLS_FILE))?;
        write_csv(&self.ground_truth, dir.join(GROUND_TRUTH_FILE))?;
        for (step, observations) in self.observations.iter().enumerate() {
            let records: Vec<ObservationRecord> = observations
                .iter()
                .map(|o| ObservationRecord { x: o.x, y: o.y })
                .collect();
            write_csv(&records, observations_dir.join(observation_file_name(step)))?;
        }
        Ok(())
    }
}

/// Parameters of a synthetic drive through a rectangular landmark grid.
///
/// The vehicle drives with a constant control from `start`; at every step each landmark within
/// `sensor_range` is observed in the vehicle frame with additive Gaussian noise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub steps: usize,
    pub delta_t: f64,
    pub start: Pose,
    pub control: Control,
    pub grid_origin_x: f64,
    pub grid_origin_y: f64,
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub landmark_spacing: f64,
    pub sensor_range: f64,
    pub observation_std: LandmarkNoise,
}
impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            steps: 200,
            delta_t: 0.1,
            start: Pose::new(0.0, 0.0, 0.0),
            control: Control::new(5.0, 0.1),
            grid_origin_x: -60.0,
            grid_origin_y: -20.0,
            grid_rows: 7,
            grid_cols: 7,
            landmark_spacing: 20.0,
            sensor_range: 50.0,
            observation_std: LandmarkNoise::default(),
        }
    }
}

impl Scenario {
    /// Landmark grid, numbered from 1 in row-major order
    pub fn landmarks(&self) -> Vec<Landmark> {
        let mut landmarks = Vec::with_capacity(self.grid_rows * self.grid_cols);
        for row in 0..self.grid_rows {
            for col in 0..self.grid_cols {
                landmarks.push(Landmark::new(
                    (landmarks.len() + 1) as u32,
                    self.grid_origin_x + col as f64 * self.landmark_spacing,
                    self.grid_origin_y + row as f64 * self.landmark_spacing,
                ));
            }
        }
        landmarks
    }

    /// Generate the dataset. The same seed always produces the same observations.
    ///
    /// # Errors
    /// [FilterError::InvalidConfig] for a zero step count or non-positive noise, time step or range.
    pub fn generate(&self, seed: u64) -> Result<Dataset> {
        if self.steps == 0 {
            return Err(FilterError::InvalidConfig(
                "scenario needs at least one step".to_string(),
            ));
        }
        if !(self.delta_t > 0.0 && self.sensor_range > 0.0) {
            return Err(FilterError::InvalidConfig(
                "scenario time step and sensor range must be positive".to_string(),
            ));
        }
        self.observation_std.validate("observation_std")?;
        let noise_x = normal(0.0, self.observation_std.x)?;
        let noise_y = normal(0.0, self.observation_std.y)?;
        let mut rng = StdRng::seed_from_u64(seed);

        let map = Map::new(self.landmarks());
        let controls = vec![self.control; self.steps - 1];
        let mut ground_truth = Vec::with_capacity(self.steps);
        ground_truth.push(self.start);
        for control in &controls {
            let previous = ground_truth[ground_truth.len() - 1];
            ground_truth.push(move_pose(&previous, control, self.delta_t));
        }

        let observations = ground_truth
            .iter()
            .map(|pose| {
                let (sin, cos) = pose.theta.sin_cos();
                map.landmarks()
                    .iter()
                    .filter(|l| l.distance_to(pose.x, pose.y) <= self.sensor_range)
                    .map(|l| {
                        let dx = l.x - pose.x;
                        let dy = l.y - pose.y;
                        Observation::new(
                            cos * dx + sin * dy + noise_x.sample(&mut rng),
                            -sin * dx + cos * dy + noise_y.sample(&mut rng),
                        )
                    })
                    .collect()
            })
            .collect();

        Ok(Dataset {
            map,
            controls,
            ground_truth,
            observations,
        })
    }
}

/// Absolute x, y and wrapped heading error of an estimate
pub fn pose_error(estimate: &Pose, truth: &Pose) -> [f64; 3] {
    [
        (estimate.x - truth.x).abs(),
        (estimate.y - truth.y).abs(),
        normalize_angle(estimate.theta - truth.theta).abs(),
    ]
}

/// One timestep of a localization run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizationRecord {
    pub step: usize,
    pub best_x: f64,
    pub best_y: f64,
    pub best_theta: f64,
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_theta: f64,
    /// Absolute errors of the configured estimate against ground truth
    pub error_x: f64,
    pub error_y: f64,
    pub error_theta: f64,
    pub effective_sample_size: f64,
    pub num_observations: usize,
    /// Landmark identifiers associated by the best particle, space separated
    pub associations: String,
    pub sense_x: String,
    pub sense_y: String,
}

/// Per-timestep output of [run_localization]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalizationResult {
    pub records: Vec<LocalizationRecord>,
}

impl LocalizationResult {
    /// Mean absolute x, y and heading error over the run, `None` for an empty result.
    pub fn mean_error(&self) -> Option<[f64; 3]> {
        if self.records.is_empty() {
            return None;
        }
        let n = self.records.len() as f64;
        let mut sum = [0.0; 3];
        for record in &self.records {
            sum[0] += record.error_x;
            sum[1] += record.error_y;
            sum[2] += record.error_theta;
        }
        Some(sum.map(|s| s / n))
    }

    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_csv(&self.records, path)
    }

    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(LocalizationResult {
            records: read_csv(path)?,
        })
    }
}

/// Sample a noisy initial position estimate around the true pose, standing in for a GPS fix.
///
/// Each axis gets one independent Gaussian draw with the matching standard deviation of `std`; the
/// heading is normalized into (-π, π].
///
/// # Errors
/// [FilterError::InvalidConfig] if any standard deviation is not strictly positive.
pub fn initial_estimate<R: Rng + ?Sized>(truth: &Pose, std: &PoseNoise, rng: &mut R) -> Result<Pose> {
    let noise = ProcessNoise::new(std)?;
    let mut pose = *truth;
    noise.perturb(&mut pose, rng);
    Ok(Pose::new(pose.x, pose.y, pose.theta))
}

/// Run the particle filter over a dataset.
///
/// The filter is initialized around a noisy estimate of the first ground-truth pose, drawn with
/// [initial_estimate] and [FilterConfig::position_std]. The estimate and the filter share one generator
/// seeded from [FilterConfig::seed], so a seeded run is reproducible. Every later step predicts with the
/// previous step's control and [FilterConfig::delta_t]. Each step then weighs the population against that
/// step's observations, records the estimates and errors, and resamples.
pub fn run_localization(dataset: &Dataset, config: &FilterConfig) -> Result<LocalizationResult> {
    dataset.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
    let start = match dataset.ground_truth.first() {
        Some(truth) => initial_estimate(truth, &config.position_std, &mut rng)?,
        None => Pose::default(),
    };
    let mut pf = ParticleFilter::new_with_rng(config.clone(), StdRng::seed_from_u64(rng.random()))?;
    let mut result = LocalizationResult::default();
    for (step, truth) in dataset.ground_truth.iter().enumerate() {
        if step == 0 {
            debug!("Initial estimate {} for true pose {}", start, truth);
            pf.init(start)?;
        } else {
            pf.predict(config.delta_t, &dataset.controls[step - 1])?;
        }
        let observations = &dataset.observations[step];
        pf.update_weights(observations, &dataset.map)?;

        let best = pf.best_particle()?.clone();
        let mean = ParticleAveragingStrategy::WeightedAverage
            .estimate(pf.particles())
            .map(|e| e.pose)
            .unwrap_or(best.pose);
        let estimate = pf.estimate()?;
        let [error_x, error_y, error_theta] = pose_error(&estimate, truth);
        let effective_sample_size = pf.effective_sample_size()?;
        debug!(
            "Step {}: estimate {}, error ({:.3}, {:.3}, {:.4}), ESS {:.1}",
            step, estimate, error_x, error_y, error_theta, effective_sample_size
        );
        result.records.push(LocalizationRecord {
            step,
            best_x: best.pose.x,
            best_y: best.pose.y,
            best_theta: best.pose.theta,
            mean_x: mean.x,
            mean_y: mean.y,
            mean_theta: mean.theta,
            error_x,
            error_y,
            error_theta,
            effective_sample_size,
            num_observations: observations.len(),
            associations: best.associations_string(),
            sense_x: best.sense_coord_string(SenseAxis::X),
            sense_y: best.sense_coord_string(SenseAxis::Y),
        });

        pf.resample()?;
    }
    if let Some([x, y, theta]) = result.mean_error() {
        info!(
            "Localization finished after {} steps, mean error x {:.3} m, y {:.3} m, heading {:.4} rad",
            result.records.len(),
            x,
            y,
            theta
        );
    }
    Ok(result)
}
