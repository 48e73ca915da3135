use super::*;
use std::f64::consts::FRAC_PI_2;

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} within {} of {}",
        actual,
        tolerance,
        expected
    );
}

#[test]
fn test_equator_prime_meridian() {
    let point = Wgs84Converter
        .to_geodetic(Vector3::new(WGS84_A, 0.0, 0.0))
        .unwrap();
    assert_close(point.latitude, 0.0, 1e-9);
    assert_close(point.longitude, 0.0, 1e-9);
    assert_close(point.elevation, 0.0, 1e-6);
}

#[test]
fn test_equator_east_with_elevation() {
    let point = Wgs84Converter
        .to_geodetic(Vector3::new(0.0, WGS84_A + 100.0, 0.0))
        .unwrap();
    assert_close(point.latitude, 0.0, 1e-9);
    assert_close(point.longitude, 90.0, 1e-9);
    assert_close(point.elevation, 100.0, 1e-6);
}

#[test]
fn test_mid_latitude_point() {
    // 45N 45E at zero elevation
    let lat = 45.0_f64.to_radians();
    let lon = 45.0_f64.to_radians();
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let n = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    let ecef = Vector3::new(
        n * lat.cos() * lon.cos(),
        n * lat.cos() * lon.sin(),
        n * (1.0 - e2) * lat.sin(),
    );

    let point = Wgs84Converter.to_geodetic(ecef).unwrap();
    assert_close(point.latitude, 45.0, 1e-7);
    assert_close(point.longitude, 45.0, 1e-7);
    assert_close(point.elevation, 0.0, 1e-3);
}

#[test]
fn test_north_pole() {
    let b = WGS84_A * (1.0 - WGS84_F);
    let point = Wgs84Converter
        .to_geodetic(Vector3::new(0.0, 0.0, b + 10.0))
        .unwrap();
    assert_close(point.latitude, 90.0, 1e-9);
    assert_close(point.elevation, 10.0, 1e-6);
}

#[test]
fn test_invalid_points_fail() {
    assert_eq!(
        Wgs84Converter.to_geodetic(Vector3::ZERO),
        Err(GeoError::EarthCenter)
    );
    assert!(matches!(
        Wgs84Converter.to_geodetic(Vector3::new(f64::NAN, 0.0, 0.0)),
        Err(GeoError::NonFinite(_))
    ));
}

#[test]
fn test_heading_cardinal_directions_at_origin() {
    // Nose along +Z (north at the equator)
    let north = heading_degrees(0.0, 0.0, 0.0, -FRAC_PI_2);
    assert!(north < 1e-6 || north > 360.0 - 1e-6, "north was {}", north);

    // Nose along +Y (east)
    assert_close(heading_degrees(0.0, 0.0, FRAC_PI_2, 0.0), 90.0, 1e-6);

    // Nose along -Z (south)
    assert_close(heading_degrees(0.0, 0.0, 0.0, FRAC_PI_2), 180.0, 1e-6);

    // Nose along -Y (west), normalised into [0, 360)
    assert_close(heading_degrees(0.0, 0.0, -FRAC_PI_2, 0.0), 270.0, 1e-6);
}
