use super::*;
use crate::composition::model::GlobalVar;
use crate::eval::globals::GlobalsTimeline;
use crate::eval::scope::{ScopeBuilder, ScopeRequest, VarLayer};
use std::rc::Rc;

fn scope_at_age(age: u64) -> Scope {
    ScopeBuilder::new(Rc::new(VarLayer::new())).build(&ScopeRequest {
        elapsed_ticks: age,
        age_ticks: age,
        depth: 0,
        shape_index: None,
        point_index: 0,
        frames: &[],
    })
}

fn animate(count: u32, condition: &str) -> GrowthAnimate {
    GrowthAnimate {
        count,
        condition: condition.to_owned(),
    }
}

fn script_count(
    cache: &mut GrowthPrefixCache,
    sources: &[String],
    capacity: u64,
    age: u64,
) -> VisibleLimit {
    compute_expression_visible_count(
        cache,
        sources,
        capacity,
        age,
        scope_at_age,
        &mut ScriptCache::new(),
        &mut Diagnostics::new(),
        &SourceLocation::new("growth.scripts"),
    )
}

#[test]
fn animate_counts_sum_true_conditions() {
    let animates = [animate(2, "age > 1"), animate(3, "age > 5")];
    let mut scripts = ScriptCache::new();
    let mut sink = Diagnostics::new();
    let loc = SourceLocation::new("growth.animates");
    let mut at = |age| {
        compute_animate_visible_count(
            &animates,
            &mut scope_at_age(age),
            &mut scripts,
            &mut sink,
            &loc,
        )
    };
    assert_eq!(at(0), 0);
    assert_eq!(at(2), 2);
    assert_eq!(at(6), 5);
}

#[test]
fn failing_conditions_count_as_false() {
    let animates = [animate(2, "missing > 1"), animate(1, "true")];
    let mut sink = Diagnostics::new();
    let n = compute_animate_visible_count(
        &animates,
        &mut scope_at_age(3),
        &mut ScriptCache::new(),
        &mut sink,
        &SourceLocation::new("a"),
    );
    assert_eq!(n, 1);
    assert_eq!(sink.len(), 1);
}

#[test]
fn add_single_reveals_one_per_tick_up_to_capacity() {
    let sources = vec!["addSingle()".to_owned()];
    let mut cache = GrowthPrefixCache::new();
    for tick in 0..12u64 {
        assert_eq!(
            script_count(&mut cache, &sources, 5, tick),
            VisibleLimit::Count((tick + 1).min(5))
        );
    }
    // Saturated at tick 4; later queries simulate nothing.
    assert_eq!(cache.simulated_ticks(), 5);
}

#[test]
fn prefix_table_only_simulates_the_gap() {
    let sources = vec!["if (age % 2 == 0) { addMultiple(2) }".to_owned()];
    let mut cache = GrowthPrefixCache::new();
    assert_eq!(script_count(&mut cache, &sources, 100, 9), VisibleLimit::Count(10));
    assert_eq!(cache.simulated_ticks(), 10);
    assert_eq!(script_count(&mut cache, &sources, 100, 3), VisibleLimit::Count(4));
    assert_eq!(cache.simulated_ticks(), 10);
    assert_eq!(script_count(&mut cache, &sources, 100, 14), VisibleLimit::Count(16));
    assert_eq!(cache.simulated_ticks(), 15);

    // A different capacity is a different table.
    assert_eq!(script_count(&mut cache, &sources, 3, 14), VisibleLimit::Count(3));
    assert_eq!(cache.len(), 2);
}

#[test]
fn clock_reading_globals_share_one_table_per_element() {
    let globals = [GlobalVar {
        name: "g".to_owned(),
        expr: "tick".to_owned(),
        ..GlobalVar::default()
    }];
    let mut timeline = GlobalsTimeline::new(&globals, 42, 8);
    let sources = vec!["if (g < 3) { addSingle() }".to_owned()];
    let mut cache = GrowthPrefixCache::new();
    let mut scripts = ScriptCache::new();
    let mut counts = Vec::new();
    for age in 0..8u64 {
        let limit = compute_expression_visible_count(
            &mut cache,
            &sources,
            5,
            age,
            |t| {
                timeline.builder_at(t).build(&ScopeRequest {
                    elapsed_ticks: t,
                    age_ticks: t,
                    depth: 0,
                    shape_index: None,
                    point_index: 0,
                    frames: &[],
                })
            },
            &mut scripts,
            &mut Diagnostics::new(),
            &SourceLocation::new("growth.scripts"),
        );
        counts.push(limit.resolve(5));
    }
    assert_eq!(counts, vec![1, 2, 3, 3, 3, 3, 3, 3]);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.simulated_ticks(), 8);
}

#[test]
fn script_counts_are_monotone_and_bounded() {
    let sources = vec![
        "addMultiple(sin(age) * 3)".to_owned(),
        "if (age > 20) { addSingle() }".to_owned(),
    ];
    let mut cache = GrowthPrefixCache::new();
    let mut prev = 0;
    for tick in 0..60 {
        let n = script_count(&mut cache, &sources, 40, tick).resolve(40);
        assert!(n >= prev, "tick {tick}: {n} < {prev}");
        assert!(n <= 40);
        prev = n;
    }
}

#[test]
fn scripts_without_growth_calls_are_unbounded() {
    let sources = vec!["let x = age * 2".to_owned()];
    let mut cache = GrowthPrefixCache::new();
    assert_eq!(script_count(&mut cache, &sources, 5, 3), VisibleLimit::Unbounded);
    assert!(cache.is_empty());
}

#[test]
fn sequenced_level_without_sources_shows_nothing() {
    assert_eq!(
        own_limit(LevelKind::SequencedGrowthShape, None, None),
        VisibleLimit::Count(0)
    );
    assert_eq!(
        own_limit(LevelKind::ParallelShape, None, None),
        VisibleLimit::Unbounded
    );
    assert_eq!(
        own_limit(
            LevelKind::SequencedGrowthShape,
            Some(2),
            Some(VisibleLimit::Count(4))
        ),
        VisibleLimit::Count(4)
    );
    let limits = compose_level_limits(&[
        LevelGrowth {
            capacity: 4,
            own: VisibleLimit::Unbounded,
        },
        LevelGrowth {
            capacity: 6,
            own: own_limit(LevelKind::SequencedGrowthShape, None, None),
        },
    ]);
    assert_eq!(limits[1].resolve(6), 0);
}

#[test]
fn ancestor_limits_scale_into_child_index_space() {
    let limits = compose_level_limits(&[
        LevelGrowth {
            capacity: 4,
            own: VisibleLimit::Count(2),
        },
        LevelGrowth {
            capacity: 10,
            own: VisibleLimit::Unbounded,
        },
        LevelGrowth {
            capacity: 3,
            own: VisibleLimit::Count(3),
        },
    ]);
    assert_eq!(limits[0], VisibleLimit::Count(2));
    // floor(2 * 10 / 4)
    assert_eq!(limits[1], VisibleLimit::Count(5));
    // min(own 3, floor(2 * 3 / 4) = 1, floor(5 * 3 / 10) = 1)
    assert_eq!(limits[2], VisibleLimit::Count(1));

    let full = compose_level_limits(&[
        LevelGrowth {
            capacity: 4,
            own: VisibleLimit::Count(4),
        },
        LevelGrowth {
            capacity: 7,
            own: VisibleLimit::Unbounded,
        },
    ]);
    assert_eq!(full[1].resolve(7), 7);
}
