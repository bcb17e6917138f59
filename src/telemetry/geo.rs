// Planar projection of GPS fixes for the map view

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.;

/// Maximum latitude representable by the spherical Mercator projection
const MAX_LATITUDE_DEG: f64 = 85.051_128_78;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

/// Spherical Mercator projection, in meters. `y` grows northwards; the map view
/// flips it if its scene axis points down.
pub fn project(longitude: f64, latitude: f64) -> PlanarPoint {
    let lat = latitude.clamp(-MAX_LATITUDE_DEG, MAX_LATITUDE_DEG).to_radians();
    PlanarPoint {
        x: EARTH_RADIUS_M * longitude.to_radians(),
        y: EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.).tan().ln(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_projects_to_origin() {
        let p = project(0., 0.);
        assert!(p.x.abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn test_projection_preserves_orientation() {
        let west = project(-1.0, 47.0);
        let east = project(1.0, 47.0);
        let south = project(0.0, 46.0);
        let north = project(0.0, 48.0);
        assert!(east.x > west.x);
        assert!(north.y > south.y);
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let p = project(1.0, 0.0);
        // ~111.19 km per degree on the mean sphere
        assert!((p.x - 111_194.93).abs() < 1.);
    }

    #[test]
    fn test_poles_are_clamped() {
        let p = project(0., 90.);
        assert!(p.y.is_finite());
    }
}
