use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{CoordinateError, Result};

/// Geocentric Cartesian coordinates (meters)
pub type Cartesian = Vector3<f64>;

/// Geographic coordinates on a reference ellipsoid
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Geodetic {
    pub lon: f64,    // degrees
    pub lat: f64,    // degrees
    pub height: f64, // meters above the ellipsoid
}

/// Reference ellipsoid given by semi-major axis and flattening
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Semi-major axis (meters)
    pub a: f64,
    /// Flattening
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6378137.0,
        f: 1.0 / 298.257223563,
    };

    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6378137.0,
        f: 1.0 / 298.257222101,
    };

    /// Semi-minor axis
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }
}

/// Default convergence tolerance for the iterative inverse (radians of latitude)
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

const MAX_ITERATIONS: usize = 100;

fn validate(geo: &Geodetic) -> Result<()> {
    if geo.lon < -360.0 || geo.lon > 360.0 {
        return Err(CoordinateError::InvalidLongitude(geo.lon).into());
    }
    if geo.lat < -360.0 || geo.lat > 360.0 {
        return Err(CoordinateError::InvalidLatitude(geo.lat).into());
    }
    Ok(())
}

/// Convert geographic coordinates to geocentric Cartesian (closed form)
pub fn geodetic_to_cartesian(geo: &Geodetic, ellipsoid: &Ellipsoid) -> Result<Cartesian> {
    validate(geo)?;

    let lat_rad = geo.lat.to_radians();
    let lon_rad = geo.lon.to_radians();
    let e2 = ellipsoid.e2();

    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();

    // Prime-vertical radius of curvature
    let n = ellipsoid.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    let x = (n + geo.height) * cos_lat * lon_rad.cos();
    let y = (n + geo.height) * cos_lat * lon_rad.sin();
    let z = (n * (1.0 - e2) + geo.height) * sin_lat;

    Ok(Vector3::new(x, y, z))
}

/// Convert geocentric Cartesian to geographic coordinates with the default tolerance
pub fn cartesian_to_geodetic(cart: &Cartesian, ellipsoid: &Ellipsoid) -> Result<Geodetic> {
    cartesian_to_geodetic_with_tolerance(cart, ellipsoid, DEFAULT_TOLERANCE)
}

/// Convert geocentric Cartesian to geographic coordinates.
///
/// Fixed-point iteration on latitude; stops when the per-step latitude change
/// drops below `tolerance` (radians) and fails with a convergence error after
/// a bounded number of iterations.
pub fn cartesian_to_geodetic_with_tolerance(
    cart: &Cartesian,
    ellipsoid: &Ellipsoid,
    tolerance: f64,
) -> Result<Geodetic> {
    let (x, y, z) = (cart.x, cart.y, cart.z);
    let a = ellipsoid.a;
    let e2 = ellipsoid.e2();

    let p = (x * x + y * y).sqrt();
    let lon = y.atan2(x).to_degrees();

    // Polar axis: latitude is exactly +/-90 and the iteration below divides
    // by cos(lat), so resolve it directly.
    if p < 1e-9 {
        return Ok(Geodetic {
            lon,
            lat: 90f64.copysign(z),
            height: z.abs() - ellipsoid.b(),
        });
    }

    let mut lat = (z / (p * (1.0 - e2))).atan();

    for _ in 0..MAX_ITERATIONS {
        let sin_lat = lat.sin();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let height = p / lat.cos() - n;
        let next = (z / (p * (1.0 - e2 * n / (n + height)))).atan();
        let delta = (next - lat).abs();
        lat = next;
        if delta < tolerance {
            let sin_lat = lat.sin();
            let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
            return Ok(Geodetic {
                lon,
                lat: lat.to_degrees(),
                height: p / lat.cos() - n,
            });
        }
    }

    Err(CoordinateError::NoConvergence {
        iterations: MAX_ITERATIONS,
        tolerance,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeomError;

    #[test]
    fn test_round_trip() {
        let geo = Geodetic {
            lon: -77.0365,
            lat: 38.8977,
            height: 100.0,
        };

        let cart = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84).unwrap();
        let back = cartesian_to_geodetic(&cart, &Ellipsoid::WGS84).unwrap();

        assert!((geo.lon - back.lon).abs() < 1e-8);
        assert!((geo.lat - back.lat).abs() < 1e-8);
        assert!((geo.height - back.height).abs() < 1e-4);
    }

    #[test]
    fn test_round_trip_over_height_range() {
        for &height in &[-1000.0, 0.0, 450.0, 9000.0] {
            for &(lon, lat) in &[(0.0, 0.0), (139.65, 35.68), (-179.9, -33.87), (12.5, 78.2)] {
                let geo = Geodetic { lon, lat, height };
                let cart = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84).unwrap();
                let back = cartesian_to_geodetic(&cart, &Ellipsoid::WGS84).unwrap();
                assert!((geo.lon - back.lon).abs() < 1e-8, "lon at {lon},{lat},{height}");
                assert!((geo.lat - back.lat).abs() < 1e-8, "lat at {lon},{lat},{height}");
                assert!((geo.height - back.height).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_equator_prime_meridian() {
        let geo = Geodetic {
            lon: 0.0,
            lat: 0.0,
            height: 0.0,
        };

        let cart = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84).unwrap();
        assert!((cart.x - Ellipsoid::WGS84.a).abs() < 1e-6);
        assert!(cart.y.abs() < 1e-6);
        assert!(cart.z.abs() < 1e-6);
    }

    #[test]
    fn test_poles() {
        for &lat in &[90.0, -90.0] {
            let geo = Geodetic {
                lon: 45.0,
                lat,
                height: 1000.0,
            };
            let cart = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84).unwrap();
            assert!(cart.x.abs() < 1e-6);
            assert!(cart.y.abs() < 1e-6);

            let back = cartesian_to_geodetic(&cart, &Ellipsoid::WGS84).unwrap();
            assert!((back.lat - lat).abs() < 1e-8);
            assert!((back.height - 1000.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_semi_minor_axis_and_eccentricity() {
        let e = Ellipsoid::WGS84;
        assert!((e.b() - 6356752.314245).abs() < 1e-3);
        assert!((e.e2() - 0.00669437999014).abs() < 1e-11);
    }

    #[test]
    fn test_grs80_differs_from_wgs84() {
        // Same semi-major axis, slightly different flattening
        assert_eq!(Ellipsoid::GRS80.a, Ellipsoid::WGS84.a);
        assert!(Ellipsoid::GRS80.f != Ellipsoid::WGS84.f);

        let geo = Geodetic {
            lon: 10.0,
            lat: 50.0,
            height: 0.0,
        };
        let w = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84).unwrap();
        let g = geodetic_to_cartesian(&geo, &Ellipsoid::GRS80).unwrap();
        assert!((w - g).norm() < 0.01);
        assert!((w - g).norm() > 0.0);
    }

    #[test]
    fn test_longitude_out_of_range() {
        let geo = Geodetic {
            lon: 400.0,
            lat: 0.0,
            height: 0.0,
        };
        let result = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84);
        assert!(matches!(
            result.unwrap_err(),
            GeomError::Coordinate(CoordinateError::InvalidLongitude(_))
        ));
    }

    #[test]
    fn test_latitude_out_of_range() {
        let geo = Geodetic {
            lon: 0.0,
            lat: -361.0,
            height: 0.0,
        };
        let result = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84);
        assert!(matches!(
            result.unwrap_err(),
            GeomError::Coordinate(CoordinateError::InvalidLatitude(_))
        ));
    }

    #[test]
    fn test_wrapped_longitude_accepted() {
        // 181 east and -179 west name the same meridian
        let a = geodetic_to_cartesian(
            &Geodetic { lon: 181.0, lat: 40.0, height: 100.0 },
            &Ellipsoid::WGS84,
        )
        .unwrap();
        let b = geodetic_to_cartesian(
            &Geodetic { lon: -179.0, lat: 40.0, height: 100.0 },
            &Ellipsoid::WGS84,
        )
        .unwrap();
        assert!((a - b).norm() < 1e-6);
    }

    #[test]
    fn test_tight_tolerance_still_converges() {
        let geo = Geodetic {
            lon: 151.21,
            lat: -33.87,
            height: 50.0,
        };
        let cart = geodetic_to_cartesian(&geo, &Ellipsoid::WGS84).unwrap();
        let back =
            cartesian_to_geodetic_with_tolerance(&cart, &Ellipsoid::WGS84, 1e-14).unwrap();
        assert!((geo.lat - back.lat).abs() < 1e-10);
    }
}
