use super::*;
use crate::composition::model::{
    Binding, GlobalVar, GrowthAnimate, GrowthConfig, LevelKind, PlaySettings,
};
use crate::foundation::diagnostics::Severity;

fn opts() -> EngineOpts {
    EngineOpts {
        growth_probe_ticks: 64,
        ..EngineOpts::default()
    }
}

fn points(ps: &[[f64; 3]]) -> Vec<Vec3> {
    ps.iter().map(|p| Vec3::from_array(*p)).collect()
}

fn level(kind: LevelKind, ps: &[[f64; 3]]) -> ShapeLevel {
    ShapeLevel {
        kind,
        points: points(ps),
        ..ShapeLevel::default()
    }
}

fn line(n: usize) -> Vec<[f64; 3]> {
    (0..n).map(|i| [i as f64, 0.0, 0.0]).collect()
}

fn card(id: &str, shape: ShapeLevel) -> Card {
    Card {
        id: id.to_owned(),
        shape,
        ..Card::default()
    }
}

fn doc(cards: Vec<Card>) -> Document {
    Document {
        name: "test".to_owned(),
        globals: Vec::new(),
        cards,
    }
}

fn visible_per_tick(session: &mut PreviewSession, ticks: u64) -> Vec<usize> {
    session
        .run(ticks)
        .iter()
        .map(PreviewFrame::visible_count)
        .collect()
}

#[test]
fn parallel_shape_places_every_point_around_the_anchor() {
    let mut c = card("a", level(LevelKind::ParallelShape, &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]));
    c.binding = Binding::Point {
        position: Vec3::new(1.0, 2.0, 3.0),
    };
    let mut session = PreviewSession::new(doc(vec![c]), opts());
    let frame = session.advance();
    assert_eq!(frame.tick, 0);
    assert_eq!(
        frame.positions,
        vec![[1.0, 2.0, 3.0], [2.0, 2.0, 3.0], [1.0, 3.0, 3.0]]
    );
    assert_eq!(frame.visible, vec![true; 3]);
    assert_eq!(frame.sizes, vec![0.2; 3]);
    assert_eq!(frame.colors[0], [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(
        frame.card_ranges,
        vec![CardRange {
            card_id: "a".to_owned(),
            start: 0,
            len: 3
        }]
    );
    assert_eq!(session.tick(), 1);
    assert!(session.diagnostics().is_empty());
}

#[test]
fn builder_bindings_repeat_the_shape_per_anchor() {
    let mut c = card("a", level(LevelKind::ParallelShape, &line(2)));
    c.binding = Binding::Builder {
        points: points(&[[0.0, 0.0, 0.0], [0.0, 0.0, 10.0]]),
    };
    let frame = PreviewSession::new(doc(vec![c]), opts()).advance();
    assert_eq!(frame.len(), 4);
    assert_eq!(frame.positions[3], [1.0, 0.0, 10.0]);
}

#[test]
fn animate_rules_drive_sequenced_visibility() {
    let mut shape = level(LevelKind::SequencedGrowthShape, &line(6));
    shape.growth = GrowthConfig {
        animates: vec![
            GrowthAnimate {
                count: 2,
                condition: "age > 1".to_owned(),
            },
            GrowthAnimate {
                count: 3,
                condition: "age > 5".to_owned(),
            },
        ],
        scripts: Vec::new(),
    };
    let mut session = PreviewSession::new(doc(vec![card("a", shape)]), opts());
    let counts = visible_per_tick(&mut session, 7);
    assert_eq!(counts, vec![0, 0, 2, 2, 2, 2, 5]);
}

#[test]
fn sequenced_level_without_growth_sources_shows_nothing() {
    let shape = level(LevelKind::SequencedGrowthShape, &line(4));
    let mut session = PreviewSession::new(doc(vec![card("a", shape)]), opts());
    assert!(visible_per_tick(&mut session, 10).iter().all(|n| *n == 0));
}

#[test]
fn add_single_reveals_one_element_per_tick() {
    let mut shape = level(LevelKind::SequencedGrowthShape, &line(5));
    shape.growth.scripts = vec!["addSingle()".to_owned()];
    let mut session = PreviewSession::new(doc(vec![card("a", shape)]), opts());
    let counts = visible_per_tick(&mut session, 12);
    let expected: Vec<usize> = (0..12).map(|t| (t + 1).min(5)).collect();
    assert_eq!(counts, expected);
    // Appear window inferred from the growth script: saturated at tick 4.
    assert_eq!(session.cycle("a").map(|c| c.appear), Some(4));
}

#[test]
fn nested_limits_apply_per_parent() {
    let mut c = card("a", level(LevelKind::ParallelShape, &line(2)));
    let mut child = level(LevelKind::SequencedGrowthShape, &line(3));
    child.growth.animates = vec![GrowthAnimate {
        count: 1,
        condition: "true".to_owned(),
    }];
    c.nested = vec![child];
    let frame = PreviewSession::new(doc(vec![c]), opts()).advance();
    assert_eq!(frame.len(), 6);
    assert_eq!(frame.visible, vec![true, false, false, true, false, false]);
}

#[test]
fn rotation_actions_transform_points() {
    let mut shape = level(LevelKind::ParallelShape, &[[0.0, 1.0, 0.0]]);
    shape.actions = vec![DisplayAction::RotateToDirection {
        direction: "Vec3(1, 0, 0)".to_owned(),
    }];
    let frame = PreviewSession::new(doc(vec![card("a", shape)]), opts()).advance();
    let p = Vec3::from_array(frame.positions[0]);
    assert!((p - Vec3::X).length() < 1e-9, "{p:?}");
}

#[test]
fn failing_script_action_leaves_point_and_warns() {
    let mut shape = level(LevelKind::ParallelShape, &[[0.0, 2.0, 0.0]]);
    shape.actions = vec![DisplayAction::Script {
        source: "point = point * 3\nundefinedThing()".to_owned(),
    }];
    let mut session = PreviewSession::new(doc(vec![card("a", shape)]), opts());
    let frame = session.advance();
    assert_eq!(frame.positions[0], [0.0, 2.0, 0.0]);
    let d = &session.diagnostics()[0];
    assert_eq!(d.severity, Severity::Warning);
    assert_eq!(d.location.path, "cards[0].shape.actions[0]");
}

#[test]
fn controllers_adjust_particle_attributes() {
    let mut c = card("a", level(LevelKind::ParallelShape, &line(2)));
    c.controllers = vec!["size = size * 2\nif (shapeIndex > 0) { visible = false }".to_owned()];
    let frame = PreviewSession::new(doc(vec![c]), opts()).advance();
    assert_eq!(frame.sizes, vec![0.4, 0.4]);
    assert_eq!(frame.visible, vec![true, false]);
}

#[test]
fn manual_disable_fades_alpha_through_the_tail() {
    let mut c = card("a", level(LevelKind::ParallelShape, &line(1)));
    c.play = PlaySettings {
        min_appear_ticks: 0,
        live_ticks: 10,
        fade_ticks: 4,
    };
    let mut session = PreviewSession::new(doc(vec![c]), opts());
    session.set_manual("a", false).unwrap();
    let alphas: Vec<f64> = session.run(6).iter().map(|f| f.colors[0][3]).collect();
    assert_eq!(alphas, vec![1.0, 0.75, 0.5, 0.25, 0.0, 0.0]);
    assert_eq!(
        session.status("a").and_then(|s| s.dissolve_start_tick),
        Some(0)
    );
    assert!(session.set_manual("missing", true).is_err());
}

#[test]
fn globals_are_visible_to_card_scripts() {
    let mut c = card("a", level(LevelKind::ParallelShape, &line(1)));
    c.particle.size = "base * 2".to_owned();
    let mut d = doc(vec![c]);
    d.globals = vec![GlobalVar {
        name: "base".to_owned(),
        expr: "1 + elapsedTickCounter".to_owned(),
        ..GlobalVar::default()
    }];
    let mut session = PreviewSession::new(d, opts());
    let sizes: Vec<f64> = session.run(3).iter().map(|f| f.sizes[0]).collect();
    assert_eq!(sizes, vec![2.0, 4.0, 6.0]);
}

#[test]
fn structural_faults_refuse_only_the_faulty_card() {
    let mut bad = card("bad", level(LevelKind::Single, &[]));
    bad.nested = vec![level(LevelKind::ParallelShape, &line(2))];
    let good = card("good", level(LevelKind::ParallelShape, &line(2)));
    let mut session = PreviewSession::new(doc(vec![bad, good]), opts());
    let frame = session.advance();
    assert_eq!(frame.card_ranges[0].len, 0);
    assert_eq!(frame.card_ranges[1].len, 2);
    assert_eq!(frame.card_visible_count("good"), Some(2));
    assert!(
        session
            .diagnostics()
            .iter()
            .any(|d| d.severity == Severity::Fatal && d.location.path == "cards[0]")
    );
}

#[test]
fn preview_is_deterministic_and_replayable() {
    let mut shape = level(LevelKind::SequencedGrowthShape, &line(8));
    shape.growth.scripts = vec!["if (age % 3 == 0) { addMultiple(2) }".to_owned()];
    shape.actions = vec![DisplayAction::RotateAroundAxis {
        angle: "age * 0.1".to_owned(),
    }];
    shape.scale.kind = ScaleKind::Bezier;
    shape.scale.min = 0.5;
    shape.scale.max = 2.0;
    let d = doc(vec![card("a", shape)]);

    let mut a = PreviewSession::new(d.clone(), opts());
    let mut b = PreviewSession::new(d, opts());
    let frames = a.run(30);
    assert_eq!(frames, b.run(30));

    a.replay();
    assert_eq!(a.tick(), 0);
    assert_eq!(a.run(30), frames);
}

#[test]
fn update_document_keeps_runtimes_of_unchanged_cards() {
    let a = card("a", level(LevelKind::ParallelShape, &line(1)));
    let b = card("b", level(LevelKind::ParallelShape, &line(1)));
    let mut session = PreviewSession::new(doc(vec![a.clone(), b.clone()]), opts());
    session.advance();
    session.set_manual("a", false).unwrap();
    session.set_manual("b", false).unwrap();

    let mut edited_b = b.clone();
    edited_b.shape.points = points(&[[5.0, 0.0, 0.0]]);
    session.update_document(doc(vec![a.clone(), edited_b]));
    assert!(session.status("a").is_some_and(|s| s.manual_override));
    assert!(session.status("b").is_some_and(|s| !s.manual_override));
    assert_eq!(session.tick(), 1);

    let mut with_globals = doc(vec![a, b]);
    with_globals.globals = vec![GlobalVar {
        name: "g".to_owned(),
        expr: "1".to_owned(),
        ..GlobalVar::default()
    }];
    session.update_document(with_globals);
    assert!(session.status("a").is_some_and(|s| !s.manual_override));
}

fn tick_gated_growth() -> Document {
    let mut shape = level(LevelKind::SequencedGrowthShape, &line(5));
    shape.growth.scripts = vec!["if (g < 3) { addSingle() }".to_owned()];
    let mut d = doc(vec![card("a", shape)]);
    d.globals = vec![GlobalVar {
        name: "g".to_owned(),
        expr: "tick".to_owned(),
        ..GlobalVar::default()
    }];
    d
}

#[test]
fn growth_replays_each_tick_with_that_ticks_globals() {
    let mut session = PreviewSession::new(tick_gated_growth(), opts());
    let counts = visible_per_tick(&mut session, 8);
    assert_eq!(counts, vec![1, 2, 3, 3, 3, 3, 3, 3]);
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));

    // One prefix table, extended tick by tick and never rebuilt from zero.
    let growth = &session.runtimes[0].growth;
    assert_eq!(growth.len(), 1);
    assert!(growth.simulated_ticks() <= opts().growth_probe_ticks + 1);
}

#[test]
fn tick_dependent_globals_keep_cache_bounded_over_long_runs() {
    let mut session = PreviewSession::new(tick_gated_growth(), opts());
    let frames = session.run(50);
    let counts: Vec<usize> = frames.iter().map(PreviewFrame::visible_count).collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{counts:?}");
    assert_eq!(session.runtimes[0].growth.len(), 1);
    let simulated = session.runtimes[0].growth.simulated_ticks();

    session.replay();
    assert_eq!(session.run(50), frames);
    assert_eq!(session.runtimes[0].growth.simulated_ticks(), simulated);
}
