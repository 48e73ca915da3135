//! Earth-centered Cartesian to geodetic conversion and heading extraction.

use crate::entity::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
mod tests;

/// WGS-84 semi-major axis (metres)
const WGS84_A: f64 = 6_378_137.0;
/// WGS-84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Points closer than this to the polar axis use the polar solution
const POLAR_EPSILON: f64 = 1e-6;

/// Latitude/longitude in degrees, elevation in metres above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoError {
    NonFinite(Vector3),
    EarthCenter,
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::NonFinite(p) => {
                write!(f, "cannot convert non-finite point ({}, {}, {})", p.x, p.y, p.z)
            }
            GeoError::EarthCenter => write!(f, "cannot convert the center of the earth"),
        }
    }
}

impl std::error::Error for GeoError {}

/// Conversion from earth-centered Cartesian coordinates to geodetic ones.
pub trait GeoConverter: Send + Sync {
    fn to_geodetic(&self, point: Vector3) -> Result<GeodeticPoint, GeoError>;
}

/// Closed-form (Heikkinen) ECEF to WGS-84 conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84Converter;

impl GeoConverter for Wgs84Converter {
    fn to_geodetic(&self, point: Vector3) -> Result<GeodeticPoint, GeoError> {
        if !point.is_finite() {
            return Err(GeoError::NonFinite(point));
        }

        let a = WGS84_A;
        let b = a * (1.0 - WGS84_F);
        let e2 = WGS84_F * (2.0 - WGS84_F);
        let ep2 = (a * a - b * b) / (b * b);

        let Vector3 { x, y, z } = point;
        let p = (x * x + y * y).sqrt();

        if p < POLAR_EPSILON {
            if z.abs() < POLAR_EPSILON {
                return Err(GeoError::EarthCenter);
            }
            return Ok(GeodeticPoint {
                latitude: 90.0_f64.copysign(z),
                longitude: 0.0,
                elevation: z.abs() - b,
            });
        }

        let big_f = 54.0 * b * b * z * z;
        let g = p * p + (1.0 - e2) * z * z - e2 * (a * a - b * b);
        let c = e2 * e2 * big_f * p * p / (g * g * g);
        let s = (1.0 + c + (c * c + 2.0 * c).sqrt()).cbrt();
        let k = s + 1.0 + 1.0 / s;
        let big_p = big_f / (3.0 * k * k * g * g);
        let q = (1.0 + 2.0 * e2 * e2 * big_p).sqrt();
        let r0 = -(big_p * e2 * p) / (1.0 + q)
            + (0.5 * a * a * (1.0 + 1.0 / q)
                - big_p * (1.0 - e2) * z * z / (q * (1.0 + q))
                - 0.5 * big_p * p * p)
                .sqrt();
        let u = ((p - e2 * r0).powi(2) + z * z).sqrt();
        let v = ((p - e2 * r0).powi(2) + (1.0 - e2) * z * z).sqrt();
        let z0 = b * b * z / (a * v);

        let geodetic = GeodeticPoint {
            latitude: ((z + ep2 * z0) / p).atan().to_degrees(),
            longitude: y.atan2(x).to_degrees(),
            elevation: u * (1.0 - b * b / (a * v)),
        };

        if geodetic.latitude.is_finite() && geodetic.longitude.is_finite() && geodetic.elevation.is_finite() {
            Ok(geodetic)
        } else {
            Err(GeoError::NonFinite(point))
        }
    }
}

/// Heading in degrees clockwise from north, in `[0, 360)`.
///
/// `latitude`/`longitude` are the entity's geodetic position in degrees;
/// `psi` and `theta` are its DIS Euler angles in radians.
pub fn heading_degrees(latitude: f64, longitude: f64, psi: f64, theta: f64) -> f64 {
    let (sin_lat, cos_lat) = latitude.to_radians().sin_cos();
    let (sin_lon, cos_lon) = longitude.to_radians().sin_cos();
    let (sin_psi, cos_psi) = psi.sin_cos();
    let (sin_theta, cos_theta) = theta.sin_cos();

    let cos_theta_cos_psi = cos_theta * cos_psi;
    let cos_theta_sin_psi = cos_theta * sin_psi;

    // Body x-axis projected on the local east and north axes
    let east = -sin_lon * cos_theta_cos_psi + cos_lon * cos_theta_sin_psi;
    let north = -sin_lat * cos_lon * cos_theta_cos_psi
        - sin_lat * sin_lon * cos_theta_sin_psi
        - cos_lat * sin_theta;

    east.atan2(north).to_degrees().rem_euclid(360.0)
}
