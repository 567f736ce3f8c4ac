//! Walk-order route optimization.
//!
//! [`optimize`] orders a set of target houses for visiting using a
//! greedy nearest-neighbor heuristic: from the starting point,
//! repeatedly walk to the closest unvisited house. This is **not**
//! optimal TSP - it trades solution quality for O(n²) simplicity,
//! which is the right trade at walk scale (n ≤ ~50 houses).
//!
//! Pure function over its inputs, no shared state; safe to call
//! concurrently from any number of callers.

use serde::{Deserialize, Serialize};

use blockwalk_core::{haversine_meters, Coordinates};

/// Assumed walking speed for duration estimates.
pub const WALKING_SPEED_KMH: f64 = 5.0;

/// Assumed minutes spent at each door.
pub const MINUTES_PER_HOUSE: f64 = 2.0;

/// One house to be routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTarget {
    /// Street address line.
    pub address: String,
    /// Coordinates of the address.
    pub location: Coordinates,
    /// Number of voters at this address.
    pub voter_count: usize,
}

/// One stop in an optimized route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    /// Street address line.
    pub address: String,
    /// Coordinates of the address.
    pub location: Coordinates,
    /// 1-based visit order.
    pub order: usize,
    /// Walking distance from the previous stop (or the start), in
    /// meters.
    pub distance_from_previous_meters: f64,
    /// Number of voters at this address.
    pub voter_count: usize,
}

/// A visit-ordered route with distance and duration estimates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedRoute {
    /// Stops in visit order.
    pub stops: Vec<RouteStop>,
    /// Total walking distance across all legs, in meters.
    pub total_distance_meters: f64,
    /// Estimated duration: walking time at [`WALKING_SPEED_KMH`] plus
    /// [`MINUTES_PER_HOUSE`] per stop.
    pub estimated_duration_minutes: f64,
}

/// Orders targets by greedy nearest-neighbor from `start`.
///
/// Deterministic for fixed inputs and always a permutation of exactly
/// the input targets. Ties on distance are broken by input order.
#[must_use]
pub fn optimize(start: Coordinates, targets: Vec<RouteTarget>) -> OptimizedRoute {
    let mut remaining = targets;
    let mut stops = Vec::with_capacity(remaining.len());
    let mut position = start;
    let mut total_distance = 0.0;

    while !remaining.is_empty() {
        let (nearest_idx, distance) = remaining
            .iter()
            .enumerate()
            .map(|(i, t)| (i, haversine_meters(position, t.location)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap_or((0, 0.0));

        let target = remaining.remove(nearest_idx);
        position = target.location;
        total_distance += distance;
        stops.push(RouteStop {
            address: target.address,
            location: target.location,
            order: stops.len() + 1,
            distance_from_previous_meters: distance,
            voter_count: target.voter_count,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let house_minutes = stops.len() as f64 * MINUTES_PER_HOUSE;
    let walking_minutes = (total_distance / 1000.0) / WALKING_SPEED_KMH * 60.0;

    OptimizedRoute {
        stops,
        total_distance_meters: total_distance,
        estimated_duration_minutes: walking_minutes + house_minutes,
    }
}
