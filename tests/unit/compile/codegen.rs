use super::*;
use crate::composition::model::{Binding, GrowthAnimate, GrowthConfig};
use crate::foundation::diagnostics::Severity;

fn global(name: &str, kind: GlobalKind, value_type: ValueType, expr: &str) -> GlobalVar {
    GlobalVar {
        name: name.to_owned(),
        kind,
        value_type,
        expr: expr.to_owned(),
    }
}

fn ring_level() -> ShapeLevel {
    ShapeLevel {
        kind: LevelKind::ParallelShape,
        points: vec![Vec3::X, -Vec3::X],
        ..ShapeLevel::default()
    }
}

fn ring_card(id: &str) -> Card {
    Card {
        id: id.to_owned(),
        shape: ring_level(),
        ..Card::default()
    }
}

fn doc(cards: Vec<Card>, globals: Vec<GlobalVar>) -> Document {
    Document {
        name: "demo ring".to_owned(),
        globals,
        cards,
    }
}

fn has_line(src: &str, line: &str) -> bool {
    src.lines().any(|l| l == line)
}

fn assert_lines(src: &str, lines: &[&str]) {
    for line in lines {
        assert!(has_line(src, line), "missing line {line:?} in:\n{src}");
    }
}

#[test]
fn class_layout() {
    let out = generate(&doc(vec![ring_card("ring")], vec![]), &GenerateOpts::default());
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert!(out.source.starts_with(HEADER));
    assert_lines(
        &out.source,
        &[
            "package generated.particles",
            "import kotlin.math.*",
            "class DemoRingComposition : ParticleComposition() {",
            "    override fun getParticles(): Map<ParticleElement, RelativeLocation> = mapOf(",
            "        ParticleElement(\"ring\", 0)",
            "            .shape(ShapeKind.PARALLEL_SHAPE, listOf(RelativeLocation(1.0, 0.0, 0.0), RelativeLocation(-1.0, 0.0, 0.0)))",
            "            .axis(Vec3(0.0, 1.0, 0.0))",
            "            .play(0, 40, 20)",
            "            .particle(color = Vec3(1.0, 1.0, 1.0), size = 0.2F, alpha = 1)",
            "            to RelativeLocation(0.0, 0.0, 0.0),",
            "    override fun onTick() {",
        ],
    );
    assert!(out.source.ends_with("    }\n}\n"));
    assert!(!out.source.contains("refreshGlobals"));
}

#[test]
fn explicit_class_name_and_empty_package() {
    let opts = GenerateOpts {
        class_name: Some("My Effect".to_owned()),
        package: String::new(),
        ..GenerateOpts::default()
    };
    let out = generate(&doc(vec![], vec![]), &opts);
    assert!(!out.source.contains("package "));
    assert!(has_line(&out.source, "class My_Effect : ParticleComposition() {"));
}

#[test]
fn globals_fields_and_fixed_point_init() {
    let globals = vec![
        global("speed", GlobalKind::Var, ValueType::Number, "0.5 * 2"),
        global("k", GlobalKind::Const, ValueType::Number, "3"),
        global("c", GlobalKind::Const, ValueType::Number, "speed + k"),
        global("a", GlobalKind::Var, ValueType::Number, "b + 1"),
        global("b", GlobalKind::Var, ValueType::Number, "2"),
        global("flag", GlobalKind::Var, ValueType::Bool, "speed > 1"),
    ];
    let out = generate(&doc(vec![], globals), &GenerateOpts::default());
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert_lines(
        &out.source,
        &[
            "    var speed: Double = 0.0",
            "    val k: Double = 3.0",
            "    val c: Double get() = speed + k",
            "    var a: Double = 0.0",
            "    var b: Double = 0.0",
            "    var flag: Boolean = false",
            "    init {",
            "        refreshGlobals()",
            "    private fun refreshGlobals() {",
            "        speed = 0.0",
            "        flag = false",
            "        repeat(8) {",
            "            speed = 0.5 * 2.0",
            "            a = b + 1.0",
            "            b = 2.0",
            "            flag = speed > 1",
        ],
    );
}

#[test]
fn ordered_globals_skip_the_fixed_point() {
    let globals = vec![
        global("speed", GlobalKind::Var, ValueType::Number, "2"),
        global("when", GlobalKind::Var, ValueType::Vec, "Vec3(speed, 0, 1)"),
    ];
    let out = generate(&doc(vec![], globals), &GenerateOpts::default());
    assert!(!out.source.contains("repeat("));
    assert_lines(
        &out.source,
        &[
            "    var when_: Vec3 = Vec3(0.0, 0.0, 0.0)",
            "        speed = 2.0",
            "        when_ = Vec3(speed, 0.0, 1.0)",
        ],
    );
}

#[test]
fn clock_reading_globals_refresh_every_tick() {
    let globals = vec![
        global("phase", GlobalKind::Var, ValueType::Number, "tick * 0.1"),
        global("wave", GlobalKind::Const, ValueType::Number, "sin(age)"),
        global("k", GlobalKind::Const, ValueType::Number, "2"),
        global("twice", GlobalKind::Const, ValueType::Number, "k * 2"),
        global("late", GlobalKind::Const, ValueType::Number, "wave + 1"),
    ];
    let out = generate(&doc(vec![ring_card("ring")], globals), &GenerateOpts::default());
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert_lines(
        &out.source,
        &[
            "    var phase: Double = 0.0",
            "    val wave: Double get() = sin(age)",
            "    val k: Double = 2.0",
            "    val twice: Double = k * 2.0",
            "    val late: Double get() = wave + 1.0",
            "    private fun refreshGlobals() {",
            "        phase = tick * 0.1",
        ],
    );
    assert!(
        out.source
            .contains("    override fun onTick() {\n        refreshGlobals()\n"),
        "{}",
        out.source
    );
    assert!(!out.source.contains("repeat("));
}

#[test]
fn invalid_global_keeps_its_default() {
    let globals = vec![global("x", GlobalKind::Var, ValueType::Number, "nope + 1")];
    let out = generate(&doc(vec![], globals), &GenerateOpts::default());
    assert!(has_line(&out.source, "    var x: Double = 0.0"));
    assert!(!out.source.contains("init {"));
    let d = &out.diagnostics.items()[0];
    assert_eq!(d.severity, Severity::Warning);
    assert_eq!(d.location.path, "globals[0].expr");
    assert_eq!(d.location.offset, Some(0));
}

#[test]
fn growth_and_scale_emission() {
    let mut card = ring_card("ring");
    card.shape.kind = LevelKind::SequencedGrowthShape;
    card.shape.growth = GrowthConfig {
        animates: vec![GrowthAnimate {
            count: 2,
            condition: "age > 2".to_owned(),
        }],
        scripts: vec!["addSingle()".to_owned()],
    };
    card.shape.scale = ScaleHelperConfig {
        kind: ScaleKind::Linear,
        min: 0.5,
        max: 1.0,
        tick_window: 20.0,
        ..ScaleHelperConfig::default()
    };
    let out = generate(&doc(vec![card], vec![]), &GenerateOpts::default());
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert_lines(
        &out.source,
        &[
            "            .addAnimate(2) { age > 2 }",
            "            .growthScript { addSingle() }",
            "            .scaleHelper(ScaleHelper.linear(0.5, 1.0, 20.0))",
        ],
    );
}

#[test]
fn bezier_helper_uses_clamped_control_points() {
    let cfg = ScaleHelperConfig {
        kind: ScaleKind::Bezier,
        min: 0.0,
        max: 2.0,
        tick_window: 20.0,
        handle1: [0.25, 0.5],
        handle2: [0.75, 1.0],
        reverse_on_disable: true,
    };
    assert_eq!(
        scale_helper(&cfg).as_deref(),
        Some("ScaleHelper.bezier(0.0, 2.0, 20.0, 5.0, 0.5, 15.0, 1.0, reverseOnDisable = true)")
    );
    assert_eq!(scale_helper(&ScaleHelperConfig::default()), None);
}

#[test]
fn nested_levels_and_builder_anchors() {
    let mut card = ring_card("ring");
    card.binding = Binding::Builder {
        points: vec![Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0)],
    };
    card.nested = vec![ShapeLevel::default()];
    let out = generate(&doc(vec![card], vec![]), &GenerateOpts::default());
    assert_lines(
        &out.source,
        &[
            "        ParticleElement(\"ring\", 0)",
            "        ParticleElement(\"ring\", 1)",
            "            .nested(",
            "                NestedLevel(1)",
            "                    .shape(ShapeKind.SINGLE, emptyList())",
            "            )",
            "            to RelativeLocation(0.0, 2.0, 0.0),",
        ],
    );
}

#[test]
fn tick_actions_and_controllers() {
    let mut card = ring_card("ring");
    card.shape.actions = vec![
        DisplayAction::RotateAroundAxis {
            angle: "age * 0.1".to_owned(),
        },
        DisplayAction::RotateToDirectionThenSpin {
            direction: "Vec3(1, 0, 0)".to_owned(),
            angle: "shapeRel0.x".to_owned(),
        },
        DisplayAction::Script {
            source: "point.y += 1".to_owned(),
        },
    ];
    card.controllers = vec!["size = size * 2".to_owned()];
    let out = generate(&doc(vec![card], vec![]), &GenerateOpts::default());
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert_lines(
        &out.source,
        &[
            "        card(\"ring\") {",
            "            level(0) {",
            "                rotateAroundAxis(age * 0.1F)",
            "                rotateToDirectionThenSpin(Vec3(1.0, 0.0, 0.0), shapeRel0.x)",
            "                script { point.y += 1 }",
            "            }",
            "            controller { size = size * 2 }",
        ],
    );
}

#[test]
fn failing_scripts_are_omitted_with_a_warning() {
    let mut card = ring_card("ring");
    card.shape.actions = vec![
        DisplayAction::Script {
            source: "point = point + shapeRel1".to_owned(),
        },
        DisplayAction::RotateAroundAxis {
            angle: "addSingle()".to_owned(),
        },
    ];
    let out = generate(&doc(vec![card], vec![]), &GenerateOpts::default());
    assert!(!out.source.contains("shapeRel1"));
    assert!(!out.source.contains("level(0)"));
    let items = out.diagnostics.items();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|d| d.severity == Severity::Warning));
    assert_eq!(items[0].location.path, "cards[0].shape.actions[0]");
    assert_eq!(items[0].location.offset, Some(16));
    assert_eq!(items[1].location.path, "cards[0].shape.actions[1]");
    assert!(items[1].message.contains("growth scripts"));
}

#[test]
fn broken_card_is_skipped_with_a_fatal() {
    let mut broken = ring_card("broken");
    broken.shape.points.clear();
    let out = generate(
        &doc(vec![broken, ring_card("ok")], vec![]),
        &GenerateOpts::default(),
    );
    assert!(!out.source.contains("\"broken\""));
    assert!(out.source.contains("ParticleElement(\"ok\", 0)"));
    assert!(out.diagnostics.has_fatal());
    assert_eq!(out.diagnostics.items()[0].location.path, "cards[0]");
}

#[test]
fn generation_is_idempotent() {
    let mut card = ring_card("ring");
    card.controllers = vec!["let t = age % 10; alpha = t > 5 ? 0.5 : 1".to_owned()];
    let d = doc(
        vec![card],
        vec![global("speed", GlobalKind::Var, ValueType::Number, "1.5")],
    );
    let a = generate(&d, &GenerateOpts::default());
    let b = generate(&d, &GenerateOpts::default());
    assert_eq!(a.source, b.source);
    assert!(a.source.contains("alpha = if (t > 5) 0.5F else 1"));
}

#[test]
fn strings_are_escaped() {
    assert_eq!(kotlin_string("a\"b$c\\d\n"), "\"a\\\"b\\$c\\\\d\\n\"");
}
