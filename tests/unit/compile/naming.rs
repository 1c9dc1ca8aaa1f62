use super::*;

fn global(name: &str) -> GlobalVar {
    GlobalVar {
        name: name.to_owned(),
        ..GlobalVar::default()
    }
}

#[test]
fn sanitizes_invalid_identifiers() {
    assert_eq!(sanitize_identifier("speed"), "speed");
    assert_eq!(sanitize_identifier("max-speed"), "max_speed");
    assert_eq!(sanitize_identifier("2fast"), "_2fast");
    assert_eq!(sanitize_identifier("when"), "when_");
    assert_eq!(sanitize_identifier(""), "_");
    assert_eq!(sanitize_identifier("a b.c"), "a_b_c");
}

#[test]
fn duplicates_get_numeric_suffixes() {
    let names = GlobalNames::assign(&[
        global("speed"),
        global("speed!"),
        global("speed?"),
        global("age"),
        global("class"),
    ]);
    assert_eq!(names.get("speed"), Some("speed"));
    assert_eq!(names.get("speed!"), Some("speed_"));
    assert_eq!(names.get("speed?"), Some("speed_2"));
    assert_eq!(names.get("age"), Some("age2"));
    assert_eq!(names.get("class"), Some("class_"));
    assert_eq!(names.get("missing"), None);
}

#[test]
fn suffixing_skips_taken_candidates() {
    let names = GlobalNames::assign(&[global("v"), global("v2"), global("v "), global("v-")]);
    assert_eq!(names.get("v"), Some("v"));
    assert_eq!(names.get("v2"), Some("v2"));
    assert_eq!(names.get("v "), Some("v_"));
    assert_eq!(names.get("v-"), Some("v_2"));
}

#[test]
fn class_names_are_pascal_cased() {
    assert_eq!(class_name_for("my cool-effect"), "MyCoolEffectComposition");
    assert_eq!(class_name_for(""), "GeneratedComposition");
    assert_eq!(class_name_for("3d ring"), "_3dRingComposition");
}
