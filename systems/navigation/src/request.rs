//! Per-unit route memory walked one waypoint at a time.

use glam::Vec2;

/// Destination plus the waypoints planned toward it.
///
/// While the route is non-empty the cursor always points at a waypoint that
/// has not been reached yet. Reaching the last waypoint clears the route.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathRequest {
    destination: Vec2,
    path: Vec<Vec2>,
    index: usize,
}

impl PathRequest {
    /// Creates a request for the provided destination and planned waypoints.
    #[must_use]
    pub fn new(destination: Vec2, path: Vec<Vec2>) -> Self {
        Self {
            destination,
            path,
            index: 0,
        }
    }

    /// Destination the route was planned for.
    #[must_use]
    pub fn destination(&self) -> Vec2 {
        self.destination
    }

    /// Reports whether waypoints remain to be walked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.index < self.path.len()
    }

    /// Waypoint the unit currently walks toward.
    #[must_use]
    pub fn next_waypoint(&self) -> Option<Vec2> {
        self.path.get(self.index).copied()
    }

    /// Waypoints that have not been reached yet.
    #[must_use]
    pub fn remaining(&self) -> &[Vec2] {
        self.path.get(self.index..).unwrap_or(&[])
    }

    /// Reports whether the route must be planned again for `destination`.
    #[must_use]
    pub fn needs_replan(&self, destination: Vec2, tolerance: f32) -> bool {
        !self.is_active() || self.destination.distance(destination) > tolerance
    }

    /// Skips every waypoint within `arrival` of `position`.
    ///
    /// Returns the waypoint to head for next, or `None` once the route is
    /// exhausted, in which case it has been cleared.
    pub fn advance(&mut self, position: Vec2, arrival: f32) -> Option<Vec2> {
        while let Some(waypoint) = self.next_waypoint() {
            if waypoint.distance(position) > arrival {
                return Some(waypoint);
            }
            self.index += 1;
        }
        self.clear();
        None
    }

    /// Forgets the route while keeping the destination.
    pub fn clear(&mut self) {
        self.path.clear();
        self.index = 0;
    }
}
