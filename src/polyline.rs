//! Polyline representation for section and route geometries.
//!
//! Sections of line carry their geometry oriented from the start point to the
//! end point. Routes stitch those pieces together in travel direction.

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_km;

/// Two points closer than this (in degrees, per axis) are the same point.
pub const POINT_TOLERANCE_DEG: f64 = 1e-6;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both coordinates are within [`POINT_TOLERANCE_DEG`].
    pub fn same_as(&self, other: &GeoPoint) -> bool {
        (self.lat - other.lat).abs() <= POINT_TOLERANCE_DEG
            && (self.lng - other.lng).abs() <= POINT_TOLERANCE_DEG
    }
}

/// An ordered sequence of geographic points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polyline {
    points: Vec<GeoPoint>,
}

impl Polyline {
    /// Creates a new Polyline from points in drawing order.
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<GeoPoint> {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<GeoPoint> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<GeoPoint> {
        self.points.last().copied()
    }

    /// Sum of haversine distances between consecutive points.
    ///
    /// Returns `None` when there are fewer than two points, so callers can
    /// fall back to another length source.
    pub fn length_km(&self) -> Option<f64> {
        if self.points.len() < 2 {
            return None;
        }
        Some(
            self.points
                .windows(2)
                .map(|pair| haversine_km(pair[0], pair[1]))
                .sum(),
        )
    }

    /// Returns the same line drawn in the opposite direction.
    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self { points }
    }

    /// Appends `points`, skipping each point that repeats the current tail.
    pub fn extend_merged(&mut self, points: &[GeoPoint]) {
        for point in points {
            if self.points.last().is_some_and(|tail| tail.same_as(point)) {
                continue;
            }
            self.points.push(*point);
        }
    }
}

impl From<Vec<GeoPoint>> for Polyline {
    fn from(points: Vec<GeoPoint>) -> Self {
        Self::new(points)
    }
}
