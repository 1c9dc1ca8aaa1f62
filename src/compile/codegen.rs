use crate::animation::scale::{control_points, effective_window};
use crate::compile::naming::{GlobalNames, class_name_for, sanitize_identifier};
use crate::compile::transpile::{INDENT, NumberMode, Transpiler, format_double};
use crate::compile::{GenerateOpts, Generated};
use crate::composition::model::{
    Card, DisplayAction, Document, GlobalKind, GlobalVar, LevelKind, ScaleHelperConfig, ScaleKind,
    ShapeLevel, ValueType,
};
use crate::eval::scope::ScopeShape;
use crate::expression::ast::Script;
use crate::expression::error::EvalFault;
use crate::expression::parser::parse_script;
use crate::expression::validate::{ScriptContext, validate_script};
use crate::foundation::core::Vec3;
use crate::foundation::diagnostics::{Diagnostics, SourceLocation};
use std::collections::BTreeSet;

const HEADER: &str = "// generated by particle-composer; do not edit";

/// Line buffer with block indentation.
#[derive(Default)]
struct KotlinWriter {
    out: String,
    depth: usize,
}

impl KotlinWriter {
    fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn lines(&mut self, lines: &[String]) {
        for l in lines {
            self.line(l);
        }
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.depth += 1;
    }

    fn close(&mut self, text: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Kotlin string literal.
pub(crate) fn kotlin_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn relative_location(v: Vec3) -> String {
    format!(
        "RelativeLocation({}, {}, {})",
        format_double(v.x),
        format_double(v.y),
        format_double(v.z)
    )
}

/// `prefix` + value lines + `suffix`, keeping multi-line values intact.
fn wrap(prefix: &str, value: &[String], suffix: &str) -> Vec<String> {
    match value {
        [] => vec![format!("{prefix}{suffix}")],
        [only] => vec![format!("{prefix}{only}{suffix}")],
        [first, middle @ .., last] => {
            let mut out = vec![format!("{prefix}{first}")];
            out.extend(middle.iter().cloned());
            out.push(format!("{last}{suffix}"));
            out
        }
    }
}

/// `prefix { body }`, on one line when the body is a single line.
fn lambda(prefix: &str, body: &[String]) -> Vec<String> {
    match body {
        [] => vec![format!("{prefix} {{}}")],
        [only] => vec![format!("{prefix} {{ {only} }}")],
        _ => {
            let mut out = vec![format!("{prefix} {{")];
            out.extend(body.iter().map(|l| format!("{INDENT}{l}")));
            out.push("}".to_owned());
            out
        }
    }
}

fn kotlin_type(t: ValueType) -> (&'static str, &'static str) {
    match t {
        ValueType::Number => ("Double", "0.0"),
        ValueType::Bool => ("Boolean", "false"),
        ValueType::Vec => ("Vec3", "Vec3(0.0, 0.0, 0.0)"),
    }
}

fn number_mode(t: ValueType) -> NumberMode {
    match t {
        ValueType::Number => NumberMode::Double,
        ValueType::Bool | ValueType::Vec => NumberMode::Float,
    }
}

fn shape_kind(kind: LevelKind) -> &'static str {
    match kind {
        LevelKind::Single => "ShapeKind.SINGLE",
        LevelKind::ParallelShape => "ShapeKind.PARALLEL_SHAPE",
        LevelKind::SequencedGrowthShape => "ShapeKind.SEQUENCED_GROWTH_SHAPE",
    }
}

fn level_location(card: &SourceLocation, depth: usize) -> SourceLocation {
    if depth == 0 {
        card.child("shape")
    } else {
        card.child(&format!("nested[{}]", depth - 1))
    }
}

/// Clamped helper instantiation, or `None` for a constant scale.
fn scale_helper(cfg: &ScaleHelperConfig) -> Option<String> {
    if cfg.kind == ScaleKind::None {
        return None;
    }
    let w = effective_window(cfg.tick_window);
    let [p0, p1, p2, p3] = control_points(cfg, w);
    let (min, max) = (format_double(p0[1]), format_double(p3[1]));
    let w = format_double(w);
    let reverse = if cfg.reverse_on_disable {
        ", reverseOnDisable = true"
    } else {
        ""
    };
    Some(match cfg.kind {
        ScaleKind::Bezier => format!(
            "ScaleHelper.bezier({min}, {max}, {w}, {}, {}, {}, {}{reverse})",
            format_double(p1[0]),
            format_double(p1[1]),
            format_double(p2[0]),
            format_double(p2[1]),
        ),
        _ => format!("ScaleHelper.linear({min}, {max}, {w}{reverse})"),
    })
}

/// Member that re-resolves var globals; called from `init` and every `onTick()`.
const REFRESH_FN: &str = "refreshGlobals";

/// How a global field is declared.
enum GlobalField {
    /// `var` with a type default, assigned in [`REFRESH_FN`].
    Var { lines: Option<Vec<String>> },
    /// `val` whose initializer reads nothing time-varying: only `pointIndex` and
    /// earlier plain consts.
    Const { lines: Vec<String> },
    /// `val` recomputed on access because it reads other globals or the clock.
    Computed { lines: Vec<String> },
    /// `val` fixed at the type default after a failed expression.
    Fallback,
}

struct Generator<'a> {
    doc: &'a Document,
    opts: &'a GenerateOpts,
    names: GlobalNames,
    class_name: String,
    sink: Diagnostics,
}

impl<'a> Generator<'a> {
    fn new(doc: &'a Document, opts: &'a GenerateOpts) -> Self {
        let class_name = match &opts.class_name {
            Some(name) => sanitize_identifier(name),
            None => class_name_for(&doc.name),
        };
        Self {
            doc,
            opts,
            names: GlobalNames::assign(&doc.globals),
            class_name,
            sink: Diagnostics::new(),
        }
    }

    /// Parse and validate `source`; a failure omits the script with a warning.
    fn prepare(
        &mut self,
        source: &str,
        shape: &ScopeShape,
        ctx: ScriptContext,
        loc: &SourceLocation,
    ) -> Option<Script> {
        let checked = parse_script(source)
            .map_err(EvalFault::from)
            .and_then(|script| validate_script(&script, shape, ctx).map(|()| script));
        match checked {
            Ok(script) => Some(script),
            Err(fault) => {
                self.sink.warn(
                    loc.clone().with_offset(fault.offset()),
                    format!("omitted from generated code: {fault}"),
                );
                None
            }
        }
    }

    fn value(
        &mut self,
        source: &str,
        shape: &ScopeShape,
        ctx: ScriptContext,
        mode: NumberMode,
        loc: &SourceLocation,
    ) -> Option<Vec<String>> {
        let script = self.prepare(source, shape, ctx, loc)?;
        Some(Transpiler::new(&self.names, &self.class_name, ctx).value(&script, mode))
    }

    fn body(
        &mut self,
        source: &str,
        shape: &ScopeShape,
        ctx: ScriptContext,
        loc: &SourceLocation,
    ) -> Option<Vec<String>> {
        let script = self.prepare(source, shape, ctx, loc)?;
        Some(Transpiler::new(&self.names, &self.class_name, ctx).body(&script, NumberMode::Float))
    }

    fn run(mut self) -> Generated {
        let mut w = KotlinWriter::default();
        w.line(HEADER);
        if !self.opts.package.is_empty() {
            w.line(&format!("package {}", self.opts.package));
        }
        w.line("");
        w.line("import kotlin.math.*");
        w.line("");
        w.open(&format!("class {} : ParticleComposition() {{", self.class_name));
        let refresh = self.emit_globals(&mut w);

        let valid: Vec<usize> = (0..self.doc.cards.len())
            .filter(|&i| match self.doc.validate_card(i) {
                Ok(()) => true,
                Err(e) => {
                    self.sink
                        .fatal(SourceLocation::new(format!("cards[{i}]")), e.to_string());
                    false
                }
            })
            .collect();

        w.open("override fun getParticles(): Map<ParticleElement, RelativeLocation> = mapOf(");
        for &i in &valid {
            self.emit_elements(&mut w, i);
        }
        w.close(")");
        w.line("");
        w.open("override fun onTick() {");
        if refresh {
            w.line(&format!("{REFRESH_FN}()"));
        }
        for &i in &valid {
            self.emit_tick(&mut w, i);
        }
        w.close("}");
        w.close("}");
        Generated {
            source: w.finish(),
            diagnostics: self.sink,
        }
    }

    /// Emits global fields; true when a refresh function was emitted.
    fn emit_globals(&mut self, w: &mut KotlinWriter) -> bool {
        let doc = self.doc;
        let shape = ScopeShape::for_globals(&doc.globals);
        let mut seen = BTreeSet::new();
        let mut plain_consts: BTreeSet<&str> = BTreeSet::new();
        let mut fields: Vec<(&GlobalVar, GlobalField, BTreeSet<String>)> = Vec::new();

        for (i, g) in doc.globals.iter().enumerate() {
            let loc = SourceLocation::new(format!("globals[{i}]"));
            if g.name.trim().is_empty() {
                self.sink.fatal(loc, format!("global {i} has an empty name"));
                continue;
            }
            if !seen.insert(g.name.as_str()) {
                self.sink.warn(
                    loc,
                    format!("duplicate global '{}' omitted from generated code", g.name),
                );
                continue;
            }
            let expr_loc = loc.child("expr");
            let script = self.prepare(&g.expr, &shape, ScriptContext::Expression, &expr_loc);
            let (lines, refs, reads_time) = match script {
                Some(script) => {
                    let mut t =
                        Transpiler::new(&self.names, &self.class_name, ScriptContext::Expression);
                    let lines = t.value(&script, number_mode(g.value_type));
                    (Some(lines), t.referenced_globals().clone(), t.reads_time())
                }
                None => (None, BTreeSet::new(), false),
            };
            let field = match (g.kind, lines) {
                (GlobalKind::Var, lines) => GlobalField::Var { lines },
                (GlobalKind::Const, Some(lines))
                    if !reads_time && refs.iter().all(|r| plain_consts.contains(r.as_str())) =>
                {
                    plain_consts.insert(g.name.as_str());
                    GlobalField::Const { lines }
                }
                (GlobalKind::Const, Some(lines)) => GlobalField::Computed { lines },
                (GlobalKind::Const, None) => GlobalField::Fallback,
            };
            fields.push((g, field, refs));
        }
        if fields.is_empty() {
            return false;
        }

        for (g, field, _) in &fields {
            let name = self.names.get(&g.name).unwrap_or(g.name.as_str());
            let (ty, default) = kotlin_type(g.value_type);
            let decl = match field {
                GlobalField::Var { .. } => vec![format!("var {name}: {ty} = {default}")],
                GlobalField::Const { lines } => wrap(&format!("val {name}: {ty} = "), lines, ""),
                GlobalField::Computed { lines } => {
                    wrap(&format!("val {name}: {ty} get() = "), lines, "")
                }
                GlobalField::Fallback => vec![format!("val {name}: {ty} = {default}")],
            };
            w.lines(&decl);
        }
        w.line("");

        // Vars reading a later (or their own) var, or a computed const, need the
        // same bounded fixed point the preview runs.
        let var_order: Vec<&str> = fields
            .iter()
            .filter(|(_, f, _)| matches!(f, GlobalField::Var { .. }))
            .map(|(g, _, _)| g.name.as_str())
            .collect();
        let computed: BTreeSet<&str> = fields
            .iter()
            .filter(|(_, f, _)| matches!(f, GlobalField::Computed { .. }))
            .map(|(g, _, _)| g.name.as_str())
            .collect();
        let mut assignments = Vec::new();
        let mut resets = Vec::new();
        let mut needs_passes = false;
        for (pos, (g, field, refs)) in fields
            .iter()
            .filter(|(_, f, _)| matches!(f, GlobalField::Var { .. }))
            .enumerate()
        {
            let GlobalField::Var { lines: Some(lines) } = field else {
                continue;
            };
            needs_passes |= refs.iter().any(|r| {
                computed.contains(r.as_str())
                    || var_order.iter().position(|v| *v == r.as_str()).is_some_and(|p| p >= pos)
            });
            let name = self.names.get(&g.name).unwrap_or(g.name.as_str());
            resets.push(format!("{name} = {}", kotlin_type(g.value_type).1));
            assignments.extend(wrap(&format!("{name} = "), lines, ""));
        }
        if assignments.is_empty() {
            return false;
        }
        w.open("init {");
        w.line(&format!("{REFRESH_FN}()"));
        w.close("}");
        w.line("");
        w.open(&format!("private fun {REFRESH_FN}() {{"));
        if needs_passes {
            // Every tick restarts the fixed point from the type defaults.
            w.lines(&resets);
            w.open(&format!("repeat({}) {{", self.opts.max_global_passes.max(1)));
            w.lines(&assignments);
            w.close("}");
        } else {
            w.lines(&assignments);
        }
        w.close("}");
        w.line("");
        true
    }

    /// Builder calls describing one level.
    fn level_chain(
        &mut self,
        levels: &[&ShapeLevel],
        depth: usize,
        loc: &SourceLocation,
    ) -> Vec<String> {
        let level = levels[depth];
        let globals = &self.doc.globals;
        let shape = ScopeShape::for_level(globals, levels, depth);
        let growth_shape = ScopeShape::for_growth(globals, levels, depth);
        let mut out = Vec::new();

        let points = if level.kind == LevelKind::Single || level.points.is_empty() {
            "emptyList()".to_owned()
        } else {
            let pts: Vec<String> = level.points.iter().map(|p| relative_location(*p)).collect();
            format!("listOf({})", pts.join(", "))
        };
        out.push(format!(".shape({}, {points})", shape_kind(level.kind)));

        if let Some(axis) = self.value(
            &level.axis,
            &shape,
            ScriptContext::Expression,
            NumberMode::Float,
            &loc.child("axis"),
        ) {
            out.extend(wrap(".axis(", &axis, ")"));
        }

        let growth_loc = loc.child("growth");
        for (j, animate) in level.growth.animates.iter().enumerate() {
            let aloc = growth_loc.child(&format!("animates[{j}]"));
            if let Some(cond) =
                self.body(&animate.condition, &growth_shape, ScriptContext::Expression, &aloc)
            {
                out.extend(lambda(&format!(".addAnimate({})", animate.count), &cond));
            }
        }
        for (j, src) in level.growth.scripts.iter().enumerate() {
            let sloc = growth_loc.child(&format!("scripts[{j}]"));
            if let Some(body) = self.body(src, &growth_shape, ScriptContext::Growth, &sloc) {
                out.extend(lambda(".growthScript", &body));
            }
        }
        if let Some(helper) = scale_helper(&level.scale) {
            out.push(format!(".scaleHelper({helper})"));
        }
        out
    }

    fn emit_elements(&mut self, w: &mut KotlinWriter, index: usize) {
        let doc = self.doc;
        let card: &Card = &doc.cards[index];
        let loc = SourceLocation::new(format!("cards[{index}]"));
        let levels = card.levels();
        let leaf = ScopeShape::for_level(&doc.globals, &levels, levels.len() - 1);

        // Everything but the anchor is shared by every anchor of the card.
        let mut chain = self.level_chain(&levels, 0, &level_location(&loc, 0));
        for depth in 1..levels.len() {
            let nested = self.level_chain(&levels, depth, &level_location(&loc, depth));
            chain.push(".nested(".to_owned());
            chain.push(format!("{INDENT}NestedLevel({depth})"));
            chain.extend(nested.into_iter().map(|l| format!("{INDENT}{INDENT}{l}")));
            chain.push(")".to_owned());
        }
        chain.push(format!(
            ".play({}, {}, {})",
            card.play.min_appear_ticks, card.play.live_ticks, card.play.fade_ticks
        ));

        let ploc = loc.child("particle");
        let mut args = Vec::new();
        for (field, src) in [
            ("color", &card.particle.color),
            ("size", &card.particle.size),
            ("alpha", &card.particle.alpha),
        ] {
            let value = self.value(
                src,
                &leaf,
                ScriptContext::Expression,
                NumberMode::Float,
                &ploc.child(field),
            );
            if let Some(v) = value {
                args.push((field, v));
            }
        }
        if args.iter().all(|(_, v)| v.len() == 1) {
            let inline: Vec<String> = args
                .iter()
                .map(|(field, v)| format!("{field} = {}", v.join("")))
                .collect();
            chain.push(format!(".particle({})", inline.join(", ")));
        } else {
            chain.push(".particle(".to_owned());
            let last = args.len().saturating_sub(1);
            for (i, (field, v)) in args.iter().enumerate() {
                let sep = if i == last { "" } else { "," };
                chain.extend(
                    wrap(&format!("{field} = "), v, sep)
                        .into_iter()
                        .map(|l| format!("{INDENT}{l}")),
                );
            }
            chain.push(")".to_owned());
        }

        for (anchor_index, anchor) in card.binding.anchors().iter().enumerate() {
            w.line(&format!(
                "ParticleElement({}, {anchor_index})",
                kotlin_string(&card.id)
            ));
            w.depth += 1;
            w.lines(&chain);
            w.line(&format!("to {},", relative_location(*anchor)));
            w.depth -= 1;
        }
    }

    fn emit_tick(&mut self, w: &mut KotlinWriter, index: usize) {
        let doc = self.doc;
        let card = &doc.cards[index];
        let loc = SourceLocation::new(format!("cards[{index}]"));
        let levels = card.levels();

        let mut body = Vec::new();
        for (depth, level) in levels.iter().enumerate() {
            let lloc = level_location(&loc, depth);
            let shape = ScopeShape::for_level(&doc.globals, &levels, depth);
            let mut actions = Vec::new();
            for (j, action) in level.actions.iter().enumerate() {
                let aloc = lloc.child(&format!("actions[{j}]"));
                actions.extend(self.action(action, &shape, &aloc));
            }
            if !actions.is_empty() {
                body.push(format!("level({depth}) {{"));
                body.extend(actions.into_iter().map(|l| format!("{INDENT}{l}")));
                body.push("}".to_owned());
            }
        }
        let leaf = ScopeShape::for_level(&doc.globals, &levels, levels.len() - 1);
        for (j, src) in card.controllers.iter().enumerate() {
            let cloc = loc.child(&format!("controllers[{j}]"));
            if let Some(lines) = self.body(src, &leaf, ScriptContext::Controller, &cloc) {
                body.extend(lambda("controller", &lines));
            }
        }
        if body.is_empty() {
            return;
        }
        w.open(&format!("card({}) {{", kotlin_string(&card.id)));
        w.lines(&body);
        w.close("}");
    }

    fn action(
        &mut self,
        action: &DisplayAction,
        shape: &ScopeShape,
        loc: &SourceLocation,
    ) -> Vec<String> {
        let expr = ScriptContext::Expression;
        match action {
            DisplayAction::RotateToDirection { direction } => self
                .value(direction, shape, expr, NumberMode::Float, loc)
                .map(|d| wrap("rotateToDirection(", &d, ")"))
                .unwrap_or_default(),
            DisplayAction::RotateAroundAxis { angle } => self
                .value(angle, shape, expr, NumberMode::Float, loc)
                .map(|a| wrap("rotateAroundAxis(", &a, ")"))
                .unwrap_or_default(),
            DisplayAction::RotateToDirectionThenSpin { direction, angle } => {
                let d = self.value(direction, shape, expr, NumberMode::Float, loc);
                let a = self.value(angle, shape, expr, NumberMode::Float, loc);
                let (Some(d), Some(a)) = (d, a) else {
                    return Vec::new();
                };
                if let ([d], [a]) = (d.as_slice(), a.as_slice()) {
                    return vec![format!("rotateToDirectionThenSpin({d}, {a})")];
                }
                let mut out = wrap("rotateToDirectionThenSpin(", &d, ",");
                out.extend(wrap(INDENT, &a, ")"));
                out
            }
            DisplayAction::Script { source } => self
                .body(source, shape, ScriptContext::Action, loc)
                .map(|b| lambda("script", &b))
                .unwrap_or_default(),
        }
    }
}

/// Emit the Kotlin class for `doc`.
///
/// Never fails: scripts that do not validate are left out with a warning, and
/// structurally broken cards are skipped with a fatal diagnostic.
#[tracing::instrument(skip(doc, opts), fields(cards = doc.cards.len(), globals = doc.globals.len()))]
pub fn generate(doc: &Document, opts: &GenerateOpts) -> Generated {
    let generated = Generator::new(doc, opts).run();
    tracing::debug!(
        bytes = generated.source.len(),
        diagnostics = generated.diagnostics.len(),
        "generated kotlin source"
    );
    generated
}

#[cfg(test)]
#[path = "../../tests/unit/compile/codegen.rs"]
mod tests;
