use crate::foundation::core::{Vec3, vec3_is_finite};
use crate::foundation::error::{ComposerError, ComposerResult};
use crate::foundation::math::StableHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Authored project document: the single input of both preview and generation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// Project name; the generated class name is derived from it.
    pub name: String,
    /// Project-global variables and constants, in declaration order.
    pub globals: Vec<GlobalVar>,
    /// Particle sources.
    pub cards: Vec<Card>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalKind {
    #[default]
    Var,
    Const,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Number,
    Bool,
    Vec,
}

/// A project-global variable. `expr` may reference base vars and other globals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalVar {
    pub name: String,
    pub kind: GlobalKind,
    pub value_type: ValueType,
    pub expr: String,
}

/// Where a card's particles are anchored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    /// One explicit anchor point.
    Point { position: Vec3 },
    /// Anchor points produced by the external builder-tree evaluator.
    Builder { points: Vec<Vec3> },
}

impl Default for Binding {
    fn default() -> Self {
        Self::Point {
            position: Vec3::ZERO,
        }
    }
}

impl Binding {
    pub fn anchors(&self) -> &[Vec3] {
        match self {
            Self::Point { position } => std::slice::from_ref(position),
            Self::Builder { points } => points,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    /// Exactly one element at the level origin; terminates nesting.
    #[default]
    Single,
    /// Every point of the shape is shown at once.
    ParallelShape,
    /// Points become visible incrementally, driven by growth sources.
    SequencedGrowthShape,
}

impl LevelKind {
    pub fn is_sequenced(self) -> bool {
        self == Self::SequencedGrowthShape
    }
}

/// Ordered transform step applied to every element of a level each tick.
///
/// All operands are expression sources evaluated against the element scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayAction {
    RotateToDirection { direction: String },
    RotateAroundAxis { angle: String },
    RotateToDirectionThenSpin { direction: String, angle: String },
    Script { source: String },
}

impl DisplayAction {
    /// Expression sources carried by this action, with their field names.
    pub fn sources(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::RotateToDirection { direction } => vec![("direction", direction)],
            Self::RotateAroundAxis { angle } => vec![("angle", angle)],
            Self::RotateToDirectionThenSpin { direction, angle } => {
                vec![("direction", direction), ("angle", angle)]
            }
            Self::Script { source } => vec![("source", source)],
        }
    }
}

/// Rule-based growth entry: `count` elements are visible while `condition` holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrowthAnimate {
    pub count: u32,
    pub condition: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Rule-based source.
    pub animates: Vec<GrowthAnimate>,
    /// Script-based source; engaged only when a script calls a growth primitive.
    pub scripts: Vec<String>,
}

impl GrowthConfig {
    pub fn has_source(&self) -> bool {
        !self.animates.is_empty() || !self.scripts.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    #[default]
    None,
    Linear,
    Bezier,
}

/// Parametric scale over a tick window. Malformed values are clamped when sampled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleHelperConfig {
    pub kind: ScaleKind,
    pub min: f64,
    pub max: f64,
    pub tick_window: f64,
    pub handle1: [f64; 2],
    pub handle2: [f64; 2],
    pub reverse_on_disable: bool,
}

impl Default for ScaleHelperConfig {
    fn default() -> Self {
        Self {
            kind: ScaleKind::None,
            min: 1.0,
            max: 1.0,
            tick_window: 20.0,
            handle1: [0.0, 0.0],
            handle2: [1.0, 1.0],
            reverse_on_disable: false,
        }
    }
}

/// One level of a card's shape chain. Depth 0 is [`Card::shape`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeLevel {
    pub kind: LevelKind,
    /// Relative offsets produced by the external builder evaluator.
    pub points: Vec<Vec3>,
    /// Vector expression for the level's initial carried axis.
    pub axis: String,
    pub actions: Vec<DisplayAction>,
    pub scale: ScaleHelperConfig,
    pub growth: GrowthConfig,
}

impl Default for ShapeLevel {
    fn default() -> Self {
        Self {
            kind: LevelKind::Single,
            points: Vec::new(),
            axis: "Vec3(0, 1, 0)".to_owned(),
            actions: Vec::new(),
            scale: ScaleHelperConfig::default(),
            growth: GrowthConfig::default(),
        }
    }
}

impl ShapeLevel {
    /// Number of elements this level contributes per parent element.
    pub fn capacity(&self) -> u64 {
        match self.kind {
            LevelKind::Single => 1,
            LevelKind::ParallelShape | LevelKind::SequencedGrowthShape => self.points.len() as u64,
        }
    }

    /// Relative offset of the element at `index`.
    pub fn offset(&self, index: usize) -> Vec3 {
        match self.kind {
            LevelKind::Single => Vec3::ZERO,
            _ => self.points.get(index).copied().unwrap_or(Vec3::ZERO),
        }
    }
}

/// Per-particle attribute initializers (expression sources).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleInit {
    pub color: String,
    pub size: String,
    pub alpha: String,
}

impl Default for ParticleInit {
    fn default() -> Self {
        Self {
            color: "Vec3(1, 1, 1)".to_owned(),
            size: "0.2".to_owned(),
            alpha: "1".to_owned(),
        }
    }
}

/// Authored half of the appear/live/fade cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaySettings {
    pub min_appear_ticks: u64,
    pub live_ticks: u64,
    pub fade_ticks: u64,
}

impl Default for PlaySettings {
    fn default() -> Self {
        Self {
            min_appear_ticks: 0,
            live_ticks: 40,
            fade_ticks: 20,
        }
    }
}

/// A particle source ("card").
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Card {
    pub id: String,
    pub binding: Binding,
    /// Depth-0 level.
    pub shape: ShapeLevel,
    /// Depth `i + 1` levels.
    pub nested: Vec<ShapeLevel>,
    pub particle: ParticleInit,
    /// Per-particle tick scripts, run after display actions.
    pub controllers: Vec<String>,
    pub play: PlaySettings,
}

impl Card {
    /// The effective level chain: stops at (and includes) the first `single` level.
    pub fn levels(&self) -> Vec<&ShapeLevel> {
        let mut out = Vec::with_capacity(1 + self.nested.len());
        for level in std::iter::once(&self.shape).chain(self.nested.iter()) {
            out.push(level);
            if level.kind == LevelKind::Single {
                break;
            }
        }
        out
    }

    /// Validate the structural invariants this card must satisfy to be evaluated.
    pub fn validate(&self) -> ComposerResult<()> {
        let chain: Vec<&ShapeLevel> =
            std::iter::once(&self.shape).chain(self.nested.iter()).collect();
        for (depth, level) in chain.iter().enumerate() {
            if level.kind == LevelKind::Single && depth + 1 < chain.len() {
                return Err(ComposerError::structure(format!(
                    "card '{}': level {depth} is single but {} nested level(s) follow it",
                    self.id,
                    chain.len() - depth - 1
                )));
            }
            if level.kind != LevelKind::Single && level.points.is_empty() {
                return Err(ComposerError::structure(format!(
                    "card '{}': shape level {depth} has no points",
                    self.id
                )));
            }
            if level.points.iter().any(|p| !vec3_is_finite(*p)) {
                return Err(ComposerError::structure(format!(
                    "card '{}': level {depth} has a non-finite point",
                    self.id
                )));
            }
            if let Some(i) = level.growth.animates.iter().position(|a| a.count == 0) {
                return Err(ComposerError::structure(format!(
                    "card '{}': level {depth} animate {i} has count 0 (must be >= 1)",
                    self.id
                )));
            }
        }
        if self.binding.anchors().is_empty() {
            return Err(ComposerError::structure(format!(
                "card '{}': builder binding produced no points",
                self.id
            )));
        }
        if self.binding.anchors().iter().any(|p| !vec3_is_finite(*p)) {
            return Err(ComposerError::structure(format!(
                "card '{}': binding has a non-finite point",
                self.id
            )));
        }
        Ok(())
    }

    /// Structural signature: changes whenever anything that affects evaluation changes.
    pub fn signature(&self) -> u64 {
        let mut h = StableHasher::new();
        write_card(&mut h, self);
        h.finish()
    }
}

impl Document {
    /// Validate document-wide invariants and every card.
    pub fn validate(&self) -> ComposerResult<()> {
        self.validate_globals()?;
        let mut ids = BTreeSet::new();
        for card in &self.cards {
            if !ids.insert(card.id.as_str()) {
                return Err(ComposerError::validation(format!(
                    "duplicate card id '{}'",
                    card.id
                )));
            }
            card.validate()?;
        }
        Ok(())
    }

    /// Validate a single card in document context (duplicate ids count as structural faults).
    pub fn validate_card(&self, index: usize) -> ComposerResult<()> {
        let card = self
            .cards
            .get(index)
            .ok_or_else(|| ComposerError::validation(format!("no card at index {index}")))?;
        if self.cards[..index].iter().any(|c| c.id == card.id) {
            return Err(ComposerError::structure(format!(
                "duplicate card id '{}'",
                card.id
            )));
        }
        card.validate()
    }

    pub fn validate_globals(&self) -> ComposerResult<()> {
        for (i, g) in self.globals.iter().enumerate() {
            if g.name.trim().is_empty() {
                return Err(ComposerError::validation(format!(
                    "global {i} has an empty name"
                )));
            }
        }
        Ok(())
    }

    /// Signature over globals only; a change here invalidates every card runtime.
    pub fn globals_signature(&self) -> u64 {
        let mut h = StableHasher::new();
        h.write_u64(self.globals.len() as u64);
        for g in &self.globals {
            h.write_str(&g.name);
            h.write_u8(g.kind as u8);
            h.write_u8(g.value_type as u8);
            h.write_str(&g.expr);
        }
        h.finish()
    }
}

fn write_card(h: &mut StableHasher, card: &Card) {
    h.write_str(&card.id);
    match &card.binding {
        Binding::Point { position } => {
            h.write_u8(0);
            h.write_vec3(*position);
        }
        Binding::Builder { points } => {
            h.write_u8(1);
            h.write_u64(points.len() as u64);
            for p in points {
                h.write_vec3(*p);
            }
        }
    }
    h.write_u64(1 + card.nested.len() as u64);
    write_level(h, &card.shape);
    for level in &card.nested {
        write_level(h, level);
    }
    h.write_str(&card.particle.color);
    h.write_str(&card.particle.size);
    h.write_str(&card.particle.alpha);
    h.write_u64(card.controllers.len() as u64);
    for c in &card.controllers {
        h.write_str(c);
    }
    h.write_u64(card.play.min_appear_ticks);
    h.write_u64(card.play.live_ticks);
    h.write_u64(card.play.fade_ticks);
}

fn write_level(h: &mut StableHasher, level: &ShapeLevel) {
    h.write_u8(level.kind as u8);
    h.write_u64(level.points.len() as u64);
    for p in &level.points {
        h.write_vec3(*p);
    }
    h.write_str(&level.axis);
    h.write_u64(level.actions.len() as u64);
    for a in &level.actions {
        let tag = match a {
            DisplayAction::RotateToDirection { .. } => 0,
            DisplayAction::RotateAroundAxis { .. } => 1,
            DisplayAction::RotateToDirectionThenSpin { .. } => 2,
            DisplayAction::Script { .. } => 3,
        };
        h.write_u8(tag);
        for (_, src) in a.sources() {
            h.write_str(src);
        }
    }
    let s = &level.scale;
    h.write_u8(s.kind as u8);
    h.write_f64(s.min);
    h.write_f64(s.max);
    h.write_f64(s.tick_window);
    h.write_f64(s.handle1[0]);
    h.write_f64(s.handle1[1]);
    h.write_f64(s.handle2[0]);
    h.write_f64(s.handle2[1]);
    h.write_bool(s.reverse_on_disable);
    h.write_u64(level.growth.animates.len() as u64);
    for a in &level.growth.animates {
        h.write_u32(a.count);
        h.write_str(&a.condition);
    }
    h.write_u64(level.growth.scripts.len() as u64);
    for s in &level.growth.scripts {
        h.write_str(s);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composition/model.rs"]
mod tests;
