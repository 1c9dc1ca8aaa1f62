use super::*;

#[test]
fn finite_check_rejects_nan_components() {
    assert!(vec3_is_finite(Vec3::new(1.0, 2.0, 3.0)));
    assert!(!vec3_is_finite(Vec3::new(f64::NAN, 0.0, 0.0)));
    assert!(!vec3_is_finite(Vec3::new(0.0, 0.0, f64::INFINITY)));
}

#[test]
fn rgba_clamps_channels() {
    let c = rgba_from(Vec3::new(2.0, -1.0, 0.5), f64::NAN);
    assert_eq!(c, [1.0, 0.0, 0.5, 0.0]);
}
