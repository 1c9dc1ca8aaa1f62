use super::*;

fn shape(kind: LevelKind, n: usize) -> ShapeLevel {
    ShapeLevel {
        kind,
        points: (0..n).map(|i| Vec3::new(i as f64, 0.0, 0.0)).collect(),
        ..ShapeLevel::default()
    }
}

#[test]
fn json_defaults_fill_missing_fields() {
    let doc: Document = serde_json::from_str(
        r#"{
            "name": "demo",
            "cards": [{
                "id": "c0",
                "binding": { "kind": "point", "position": [1.0, 2.0, 3.0] },
                "shape": { "kind": "parallel_shape", "points": [[0, 0, 0], [1, 0, 0]] }
            }]
        }"#,
    )
    .unwrap();
    let card = &doc.cards[0];
    assert_eq!(card.binding.anchors(), &[Vec3::new(1.0, 2.0, 3.0)]);
    assert_eq!(card.shape.axis, "Vec3(0, 1, 0)");
    assert_eq!(card.shape.capacity(), 2);
    assert_eq!(card.play, PlaySettings::default());
    doc.validate().unwrap();
}

#[test]
fn level_after_single_is_a_structural_fault() {
    let card = Card {
        id: "bad".to_owned(),
        shape: shape(LevelKind::Single, 0),
        nested: vec![shape(LevelKind::ParallelShape, 3)],
        ..Card::default()
    };
    let err = card.validate().unwrap_err();
    assert!(matches!(err, ComposerError::Structure(_)));
    assert_eq!(card.levels().len(), 1);
}

#[test]
fn zero_count_animate_is_rejected() {
    let mut level = shape(LevelKind::SequencedGrowthShape, 3);
    level.growth.animates.push(GrowthAnimate {
        count: 0,
        condition: "true".to_owned(),
    });
    let card = Card {
        id: "c".to_owned(),
        shape: level,
        ..Card::default()
    };
    assert!(card.validate().is_err());
}

#[test]
fn duplicate_ids_are_flagged_on_the_later_card() {
    let c = Card {
        id: "same".to_owned(),
        ..Card::default()
    };
    let doc = Document {
        cards: vec![c.clone(), c],
        ..Document::default()
    };
    assert!(doc.validate_card(0).is_ok());
    assert!(doc.validate_card(1).is_err());
    assert!(doc.validate().is_err());
}

#[test]
fn signature_tracks_script_edits() {
    let mut card = Card {
        id: "c".to_owned(),
        shape: shape(LevelKind::SequencedGrowthShape, 4),
        ..Card::default()
    };
    card.shape.growth.scripts.push("addSingle()".to_owned());
    let a = card.signature();
    assert_eq!(a, card.clone().signature());
    card.shape.growth.scripts[0] = "addMultiple(2)".to_owned();
    assert_ne!(a, card.signature());
}

#[test]
fn single_level_capacity_is_one() {
    let level = shape(LevelKind::Single, 5);
    assert_eq!(level.capacity(), 1);
    assert_eq!(level.offset(3), Vec3::ZERO);
}
