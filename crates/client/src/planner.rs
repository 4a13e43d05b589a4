//! Viewport-to-query planner.
//!
//! Turns a map viewport into a bounded heatmap query region. Radii are
//! quantized and grid sizes move along a fixed ladder with hysteresis, so
//! small pans and zooms do not trigger new fetches.

use std::fmt;

use domain::models::geo::GeoPoint;
use shared::geo::{to_e4, METERS_PER_DEGREE};

use crate::config::PlannerSettings;

pub const MIN_RADIUS_METERS: f64 = 1000.0;
pub const RADIUS_QUANTUM_METERS: f64 = 250.0;
pub const VIEWPORT_MARGIN: f64 = 1.1;

/// Grid cell sizes in meters, smallest first.
pub const GRID_LADDER: [u32; 3] = [50, 100, 200];
pub const INITIAL_GRID_SIZE: u32 = 100;

// Hysteresis bands between neighbouring ladder steps.
const FINE_TO_MEDIUM_ABOVE: f64 = 3500.0;
const MEDIUM_TO_FINE_BELOW: f64 = 2500.0;
const MEDIUM_TO_COARSE_ABOVE: f64 = 8000.0;
const COARSE_TO_MEDIUM_BELOW: f64 = 6500.0;

/// Visible map area as reported by the map widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl Viewport {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Resolved heatmap query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryRegion {
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
    pub grid_size_meters: u32,
}

impl QueryRegion {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn key(&self) -> RegionKey {
        RegionKey {
            lat_e4: to_e4(self.lat),
            lng_e4: to_e4(self.lng),
            radius_m: self.radius_meters.round() as i64,
            grid_m: self.grid_size_meters,
        }
    }
}

/// Identity of a query region; equal keys mean no refetch is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionKey {
    lat_e4: i64,
    lng_e4: i64,
    radius_m: i64,
    grid_m: u32,
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.lat_e4, self.lng_e4, self.radius_m, self.grid_m
        )
    }
}

/// Radius covering the viewport plus a margin, before quantization.
pub fn viewport_radius(viewport: &Viewport) -> f64 {
    let height = viewport.latitude_delta.abs() * METERS_PER_DEGREE;
    let width = viewport.longitude_delta.abs()
        * METERS_PER_DEGREE
        * viewport.latitude.to_radians().cos();
    height.max(width) / 2.0 * VIEWPORT_MARGIN
}

/// Rounds to the nearest quantum and clamps into `[MIN_RADIUS_METERS, max_radius]`.
pub fn quantize_radius(radius: f64, max_radius: f64) -> f64 {
    let stepped = (radius / RADIUS_QUANTUM_METERS).round() * RADIUS_QUANTUM_METERS;
    stepped.clamp(MIN_RADIUS_METERS, max_radius.max(MIN_RADIUS_METERS))
}

/// Picks the grid size for `radius` starting from `previous`.
///
/// A step is only taken once the radius leaves the band around the current
/// size, and never to a size above `max_grid`.
pub fn next_grid_size(previous: u32, radius: f64, max_grid: u32) -> u32 {
    let mut grid = snap_to_ladder(previous, max_grid);
    loop {
        let next = match grid {
            50 if radius > FINE_TO_MEDIUM_ABOVE => 100,
            100 if radius < MEDIUM_TO_FINE_BELOW => 50,
            100 if radius > MEDIUM_TO_COARSE_ABOVE => 200,
            200 if radius < COARSE_TO_MEDIUM_BELOW => 100,
            _ => grid,
        };
        if next == grid || next > max_grid {
            return grid;
        }
        grid = next;
    }
}

fn snap_to_ladder(grid: u32, max_grid: u32) -> u32 {
    let ceiling = grid.min(max_grid);
    GRID_LADDER
        .iter()
        .rev()
        .copied()
        .find(|step| *step <= ceiling)
        .unwrap_or(GRID_LADDER[0])
}

/// Stateful planner remembering the previous grid size and region.
#[derive(Debug, Clone)]
pub struct ViewportPlanner {
    max_radius: f64,
    max_grid: u32,
    grid_size: u32,
    last_region: Option<RegionKey>,
}

impl ViewportPlanner {
    pub fn new(settings: &PlannerSettings) -> Self {
        Self {
            max_radius: settings.max_radius_meters,
            max_grid: settings.max_grid_size_meters,
            grid_size: snap_to_ladder(INITIAL_GRID_SIZE, settings.max_grid_size_meters),
            last_region: None,
        }
    }

    /// Resolves the query region for `viewport` without recording it.
    pub fn resolve(&mut self, viewport: &Viewport) -> Option<QueryRegion> {
        if viewport.center().validate().is_err()
            || !viewport.latitude_delta.is_finite()
            || !viewport.longitude_delta.is_finite()
        {
            tracing::debug!(?viewport, "Ignoring invalid viewport");
            return None;
        }

        let radius = quantize_radius(viewport_radius(viewport), self.max_radius);
        self.grid_size = next_grid_size(self.grid_size, radius, self.max_grid);

        Some(QueryRegion {
            lat: viewport.latitude,
            lng: viewport.longitude,
            radius_meters: radius,
            grid_size_meters: self.grid_size,
        })
    }

    /// Plans a query for `viewport`. Returns `None` when the region is the
    /// same as the previous one or the viewport is invalid.
    pub fn plan(&mut self, viewport: &Viewport) -> Option<QueryRegion> {
        let region = self.resolve(viewport)?;
        let key = region.key();
        if self.last_region == Some(key) {
            return None;
        }
        self.last_region = Some(key);
        Some(region)
    }

    /// Forgets the previous region so the next plan always yields a query.
    pub fn invalidate(&mut self) {
        self.last_region = None;
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(lat: f64, lng: f64, delta: f64) -> Viewport {
        Viewport {
            latitude: lat,
            longitude: lng,
            latitude_delta: delta,
            longitude_delta: delta,
        }
    }

    fn planner() -> ViewportPlanner {
        ViewportPlanner::new(&PlannerSettings::default())
    }

    #[test]
    fn test_viewport_radius_uses_larger_side() {
        // At the equator width and height match: 0.02 deg = 2220 m.
        let radius = viewport_radius(&viewport(0.0, 0.0, 0.02));
        assert!((radius - 1221.0).abs() < 1e-6);

        // At 60 degrees the width halves, so height wins.
        let tall = Viewport {
            latitude: 60.0,
            longitude: 0.0,
            latitude_delta: 0.02,
            longitude_delta: 0.03,
        };
        assert!((viewport_radius(&tall) - 1221.0).abs() < 1e-6);
    }

    #[test]
    fn test_quantize_rounds_and_clamps() {
        assert_eq!(quantize_radius(1221.0, 10_000.0), 1250.0);
        assert_eq!(quantize_radius(1124.0, 10_000.0), 1000.0);
        assert_eq!(quantize_radius(300.0, 10_000.0), 1000.0);
        assert_eq!(quantize_radius(54_321.0, 10_000.0), 10_000.0);
        assert_eq!(quantize_radius(4_380.0, 10_000.0), 4_500.0);
    }

    #[test]
    fn test_grid_hysteresis_does_not_thrash() {
        let mut grid = 100;
        let mut flips = 0;
        for radius in [2400.0, 2600.0, 2400.0, 2600.0, 2450.0, 2550.0, 2400.0] {
            let next = next_grid_size(grid, radius, 200);
            if next != grid {
                flips += 1;
            }
            grid = next;
        }
        assert_eq!(flips, 1);
        assert_eq!(grid, 50);
    }

    #[test]
    fn test_grid_steps_through_ladder() {
        assert_eq!(next_grid_size(100, 5000.0, 200), 100);
        assert_eq!(next_grid_size(100, 8500.0, 200), 200);
        assert_eq!(next_grid_size(200, 7000.0, 200), 200);
        assert_eq!(next_grid_size(200, 6000.0, 200), 100);
        assert_eq!(next_grid_size(200, 2000.0, 200), 50);
        assert_eq!(next_grid_size(50, 3000.0, 200), 50);
        assert_eq!(next_grid_size(50, 9000.0, 200), 200);
    }

    #[test]
    fn test_grid_respects_max() {
        assert_eq!(next_grid_size(100, 9000.0, 100), 100);
        assert_eq!(next_grid_size(200, 9000.0, 100), 100);
        assert_eq!(next_grid_size(100, 9000.0, 60), 50);
    }

    #[test]
    fn test_plan_suppresses_unchanged_region() {
        let mut planner = planner();
        let first = planner.plan(&viewport(13.0827, 80.2707, 0.02)).unwrap();
        assert_eq!(first.radius_meters, 1250.0);
        assert_eq!(first.grid_size_meters, 50);

        assert!(planner.plan(&viewport(13.082_71, 80.270_69, 0.0201)).is_none());

        planner.invalidate();
        assert!(planner.plan(&viewport(13.0827, 80.2707, 0.02)).is_some());
    }

    #[test]
    fn test_plan_never_exceeds_max_radius() {
        let mut planner = ViewportPlanner::new(&PlannerSettings {
            max_radius_meters: 5000.0,
            ..PlannerSettings::default()
        });
        let region = planner.plan(&viewport(13.0, 80.0, 2.0)).unwrap();
        assert_eq!(region.radius_meters, 5000.0);
        assert_eq!(region.grid_size_meters, 100);
    }

    #[test]
    fn test_plan_rejects_invalid_viewport() {
        let mut planner = planner();
        assert!(planner.plan(&viewport(f64::NAN, 80.0, 0.02)).is_none());
        assert!(planner.plan(&viewport(13.0, 80.0, f64::INFINITY)).is_none());
    }

    #[test]
    fn test_zooming_out_coarsens_grid() {
        let mut planner = planner();
        planner.plan(&viewport(13.0, 80.0, 0.2)).unwrap();
        assert_eq!(planner.grid_size(), 200);
    }
}
