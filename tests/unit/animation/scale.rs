use super::*;

fn cfg(kind: ScaleKind, min: f64, max: f64, w: f64) -> ScaleHelperConfig {
    ScaleHelperConfig {
        kind,
        min,
        max,
        tick_window: w,
        ..ScaleHelperConfig::default()
    }
}

#[test]
fn none_is_constant_one() {
    let c = cfg(ScaleKind::None, 0.2, 5.0, 10.0);
    for t in [0.0, 3.0, 10.0, 99.0] {
        assert_eq!(sample(&c, t, 10.0), 1.0);
    }
}

#[test]
fn linear_midpoint_example() {
    let c = cfg(ScaleKind::Linear, 0.01, 4.0, 18.0);
    assert!((sample(&c, 9.0, 18.0) - 2.005).abs() < 1e-6);
    assert_eq!(sample(&c, -3.0, 18.0), 0.01);
    assert_eq!(sample(&c, 40.0, 18.0), 4.0);
}

#[test]
fn bezier_endpoints_are_exact() {
    let handles = [
        ([0.0, 0.0], [1.0, 1.0]),
        ([0.42, 3.0], [0.58, -2.0]),
        ([7.0, 0.5], [2.0, 9.0]),
        ([-4.0, 1.0], [50.0, 1.0]),
    ];
    for (h1, h2) in handles {
        for (min, max, w) in [(0.1, 3.0, 20.0), (2.0, 0.5, 7.0), (1.0, 1.0, 1.0)] {
            let c = ScaleHelperConfig {
                handle1: h1,
                handle2: h2,
                ..cfg(ScaleKind::Bezier, min, max, w)
            };
            assert_eq!(sample(&c, 0.0, w), min);
            assert_eq!(sample(&c, w, w), max);
            assert_eq!(sample(&c, w + 5.0, w), max);
        }
    }
}

#[test]
fn bezier_with_straight_handles_is_linear() {
    let w = 12.0;
    let c = ScaleHelperConfig {
        handle1: [w / 3.0, 1.0 + 3.0 / 3.0],
        handle2: [2.0 * w / 3.0, 1.0 + 2.0 * 3.0 / 3.0],
        ..cfg(ScaleKind::Bezier, 1.0, 4.0, w)
    };
    for t in [1.0, 3.5, 6.0, 11.0] {
        let expected = 1.0 + 3.0 * t / w;
        assert!((sample(&c, t, w) - expected).abs() < 1e-6, "t={t}");
    }
}

#[test]
fn legacy_fraction_handles_are_rescaled_and_clamped() {
    let c = ScaleHelperConfig {
        handle1: [0.5, 2.0],
        handle2: [-30.0, 3.0],
        ..cfg(ScaleKind::Bezier, 0.0, 1.0, 10.0)
    };
    let [_, p1, p2, p3] = control_points(&c, 10.0);
    assert_eq!(p1, [5.0, 2.0]);
    assert_eq!(p2, [0.0, 3.0]);
    assert_eq!(p3, [10.0, 1.0]);

    let broken = ScaleHelperConfig {
        handle1: [f64::NAN, 0.0],
        ..c.clone()
    };
    let [_, p1, _, _] = control_points(&broken, 10.0);
    assert!((p1[0] - 10.0 / 3.0).abs() < 1e-12);
}

#[test]
fn degenerate_window_is_treated_as_one_tick() {
    let c = cfg(ScaleKind::Linear, 0.0, 2.0, 0.0);
    assert_eq!(sample(&c, 0.5, 0.0), 1.0);
    assert_eq!(sample(&c, 1.0, f64::NAN), 2.0);
}

#[test]
fn reverse_fade_walks_back_from_the_fade_start() {
    let c = cfg(ScaleKind::Linear, 0.0, 10.0, 10.0);
    assert_eq!(sample_fading(&c, 8.0, 0.0, 4.0, 10.0), 8.0);
    assert!((sample_fading(&c, 8.0, 2.0, 4.0, 10.0) - 4.0).abs() < 1e-12);
    assert_eq!(sample_fading(&c, 8.0, 4.0, 4.0, 10.0), 0.0);
    assert_eq!(sample_fading(&c, 8.0, 9.0, 4.0, 10.0), 0.0);
    assert_eq!(sample_fading(&c, 30.0, 0.0, 4.0, 10.0), 10.0);
    assert_eq!(fade_fraction(3.0, 0.0), 1.0);
}
