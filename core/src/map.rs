//! Landmark map, sensor observations and data association
//!
//! The map is a fixed, externally supplied list of point landmarks. Observations are points expressed in
//! the vehicle frame and are matched to the map by nearest-neighbour search after being transformed into
//! the map frame for a given particle (see [crate::particle::Particle::to_map_frame]).
//!
//! Association is a linear scan over the map in its stored order. Ties are broken in favour of the first
//! landmark that achieves the minimum distance, so results are deterministic for a fixed map. The scan
//! runs once per (particle, observation) pair per cycle and dominates the cost of a filter cycle.
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// A fixed landmark of the known map
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}
impl Landmark {
    pub fn new(id: u32, x: f64, y: f64) -> Self {
        Landmark { id, x, y }
    }
    /// Euclidean distance from the landmark to a map-frame point
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}
impl Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Landmark(id: {}, x: {}, y: {})", self.id, self.x, self.y)
    }
}

/// A landmark observation in the vehicle frame
///
/// The identifier is unset until the observation has been associated with a landmark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub id: Option<u32>,
    pub x: f64,
    pub y: f64,
}
impl Observation {
    pub fn new(x: f64, y: f64) -> Self {
        Observation { id: None, x, y }
    }
}

/// A fixed collection of landmarks
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    landmarks: Vec<Landmark>,
}

impl Map {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Map { landmarks }
    }
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Find the landmark closest to a map-frame point.
    ///
    /// Returns the first landmark (in map order) that achieves the minimum Euclidean distance.
    ///
    /// # Errors
    /// [FilterError::EmptyMap] if the map has no landmarks.
    pub fn nearest(&self, x: f64, y: f64) -> Result<&Landmark> {
        nearest_of(self.landmarks.iter(), x, y).ok_or(FilterError::EmptyMap)
    }

    /// Find the landmark closest to a map-frame point among those within `range` of `(center_x, center_y)`.
    ///
    /// When no landmark lies within range the whole map is searched instead, so an association is
    /// produced whenever the map is non-empty.
    ///
    /// # Errors
    /// [FilterError::EmptyMap] if the map has no landmarks.
    pub fn nearest_within_range(
        &self,
        x: f64,
        y: f64,
        center_x: f64,
        center_y: f64,
        range: f64,
    ) -> Result<&Landmark> {
        let in_range = self
            .landmarks
            .iter()
            .filter(|lm| lm.distance_to(center_x, center_y) <= range);
        match nearest_of(in_range, x, y) {
            Some(landmark) => Ok(landmark),
            None => self.nearest(x, y),
        }
    }
}

impl From<Vec<Landmark>> for Map {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Map::new(landmarks)
    }
}

fn nearest_of<'a, I>(candidates: I, x: f64, y: f64) -> Option<&'a Landmark>
where
    I: Iterator<Item = &'a Landmark>,
{
    let mut best: Option<(&Landmark, f64)> = None;
    for landmark in candidates {
        let distance = landmark.distance_to(x, y);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((landmark, distance)),
        }
    }
    best.map(|(landmark, _)| landmark)
}
