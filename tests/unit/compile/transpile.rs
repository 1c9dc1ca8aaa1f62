use super::*;
use crate::composition::model::GlobalVar;
use crate::expression::parser::parse_script;

fn names(globals: &[&str]) -> GlobalNames {
    let vars: Vec<GlobalVar> = globals
        .iter()
        .map(|n| GlobalVar {
            name: (*n).to_owned(),
            ..GlobalVar::default()
        })
        .collect();
    GlobalNames::assign(&vars)
}

fn value(src: &str, names: &GlobalNames, mode: NumberMode) -> Vec<String> {
    let script = parse_script(src).unwrap();
    Transpiler::new(names, "Demo", ScriptContext::Expression).value(&script, mode)
}

fn inline(src: &str) -> String {
    let lines = value(src, &names(&["speed"]), NumberMode::Float);
    assert_eq!(lines.len(), 1, "{lines:?}");
    lines[0].clone()
}

fn body(src: &str, ctx: ScriptContext) -> Vec<String> {
    let names = names(&["speed", "age"]);
    let script = parse_script(src).unwrap();
    Transpiler::new(&names, "Demo", ctx).body(&script, NumberMode::Float)
}

#[test]
fn literal_suffixes() {
    assert_eq!(inline("0.5 * 2"), "0.5F * 2");
    assert_eq!(inline("1.0"), "1.0F");
    assert_eq!(inline("Vec3(1, 0.5, -2)"), "Vec3(1.0, 0.5, -2.0)");
    assert_eq!(
        value("speed + 1", &names(&["speed"]), NumberMode::Double),
        vec!["speed + 1.0"]
    );
}

#[test]
fn doubles_are_deterministic() {
    assert_eq!(format_double(-0.0), "0.0");
    assert_eq!(format_double(3.0), "3.0");
    assert_eq!(format_double(0.25), "0.25");
    assert_eq!(format_double(f64::NAN), "0.0");
}

#[test]
fn operators_and_precedence() {
    assert_eq!(inline("a === b"), "a == b");
    assert_eq!(inline("a !== b"), "a != b");
    assert_eq!(inline("(1 + 2) * 3"), "(1 + 2) * 3");
    assert_eq!(inline("1 + 2 * 3"), "1 + 2 * 3");
    assert_eq!(inline("1 - (2 - 3)"), "1 - (2 - 3)");
    assert_eq!(inline("-(-x)"), "-(-x)");
    assert_eq!(inline("(a + b).x"), "(a + b).x");
    assert_eq!(inline("!(a && b) || c"), "!(a && b) || c");
}

#[test]
fn ternaries_become_if_expressions() {
    assert_eq!(inline("age > 2 ? 1 : 0"), "if (age > 2) 1 else 0");
    assert_eq!(inline("1 + (c ? 2 : 3)"), "1 + (if (c) 2 else 3)");
    assert_eq!(inline("a ? 1 : b ? 2 : 3"), "if (a) 1 else if (b) 2 else 3");
}

#[test]
fn globals_are_renamed_and_qualified() {
    let names = names(&["speed", "age", "max-size"]);
    assert_eq!(
        value("age + speed + max-size", &names, NumberMode::Float),
        vec!["age2 + speed + max - size"]
    );
    assert_eq!(
        value("this.speed * 2", &names, NumberMode::Float),
        vec!["this@Demo.speed * 2"]
    );
}

#[test]
fn declarations_and_blocks() {
    let lines = body(
        "let speed = 1; const k = 2; speed += k; if (speed > 2) { this.speed = speed } else if (k) { k } else { 0 }",
        ScriptContext::Expression,
    );
    assert_eq!(
        lines,
        vec![
            "var speed = 1",
            "val k = 2",
            "speed += k",
            "if (speed > 2) {",
            "    this@Demo.speed = speed",
            "} else if (k) {",
            "    k",
            "} else {",
            "    0",
            "}",
        ]
    );
}

#[test]
fn locals_do_not_leak_out_of_blocks() {
    let lines = body("if (true) { let speed = 1 } speed", ScriptContext::Expression);
    assert_eq!(lines, vec!["if (true) {", "    var speed = 1", "}", "speed"]);
}

#[test]
fn shadowed_renamed_global_is_qualified() {
    // The global `age` is spelled `age2`; a local spelled `age2` hides it.
    let lines = body("let age2 = 1; age2 + age", ScriptContext::Expression);
    assert_eq!(lines, vec!["var age2 = 1", "age2 + this@Demo.age2"]);
}

#[test]
fn context_names_pass_through() {
    let lines = body("point.y += 1; rotateAroundAxis(0.5)", ScriptContext::Action);
    assert_eq!(lines, vec!["point.y += 1", "rotateAroundAxis(0.5F)"]);
    let lines = body("size = size * 2", ScriptContext::Controller);
    assert_eq!(lines, vec!["size = size * 2"]);
}

#[test]
fn multi_statement_values_use_run_blocks() {
    let lines = value("let a = 2; a * age", &names(&[]), NumberMode::Float);
    assert_eq!(lines, vec!["run {", "    var a = 2", "    a * age", "}"]);
}

#[test]
fn referenced_globals_are_tracked() {
    let names = names(&["a", "b", "c"]);
    let script = parse_script("let c = 1; a + this.b + c").unwrap();
    let mut t = Transpiler::new(&names, "Demo", ScriptContext::Expression);
    t.value(&script, NumberMode::Double);
    let seen: Vec<&str> = t.referenced_globals().iter().map(String::as_str).collect();
    assert_eq!(seen, vec!["a", "b"]);
}

#[test]
fn clock_reads_are_tracked() {
    let names = names(&["speed"]);
    let mut t = Transpiler::new(&names, "Demo", ScriptContext::Expression);
    t.value(&parse_script("speed * 2").unwrap(), NumberMode::Double);
    assert!(!t.reads_time());
    t.value(&parse_script("let age2 = elapsedTickCounter; age2").unwrap(), NumberMode::Double);
    assert!(t.reads_time());

    // A global named like a base var shadows it.
    let shadowing = self::names(&["tick"]);
    let mut t = Transpiler::new(&shadowing, "Demo", ScriptContext::Expression);
    t.value(&parse_script("tick + 1").unwrap(), NumberMode::Double);
    assert!(!t.reads_time());
}
