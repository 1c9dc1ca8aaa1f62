//! Kotlin identifier naming for generated code.

use crate::composition::model::GlobalVar;
use crate::eval::scope::BASE_VARS;
use std::collections::{BTreeMap, BTreeSet};

/// Kotlin hard keywords; these cannot be used as identifiers.
const HARD_KEYWORDS: &[&str] = &[
    "as", "break", "class", "continue", "do", "else", "false", "for", "fun", "if", "in",
    "interface", "is", "null", "object", "package", "return", "super", "this", "throw", "true",
    "try", "typealias", "typeof", "val", "var", "when", "while",
];

/// Members of the generated class and its host base class.
const RESERVED_MEMBERS: &[&str] = &["getParticles", "onTick", "refreshGlobals", "shapeIndex"];

pub fn is_hard_keyword(s: &str) -> bool {
    HARD_KEYWORDS.contains(&s)
}

/// Map an arbitrary name onto a valid Kotlin identifier.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if is_hard_keyword(&out) {
        out.push('_');
    }
    out
}

/// `"my cool-effect"` -> `"MyCoolEffect"`.
pub fn pascal_case(name: &str) -> String {
    let mut out = String::new();
    for word in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    out
}

/// Default class name for a document: PascalCased name + `Composition`.
pub fn class_name_for(doc_name: &str) -> String {
    let base = pascal_case(doc_name);
    let base = if base.is_empty() { "Generated".to_owned() } else { base };
    sanitize_identifier(&format!("{base}Composition"))
}

/// Sanitized, collision-free Kotlin names for every global.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalNames {
    map: BTreeMap<String, String>,
}

impl GlobalNames {
    /// Assign names in declaration order; collisions get `2`, `3`, ... suffixes.
    pub fn assign(globals: &[GlobalVar]) -> Self {
        let mut used: BTreeSet<String> = BASE_VARS
            .iter()
            .chain(RESERVED_MEMBERS)
            .map(|s| (*s).to_owned())
            .collect();
        let mut map = BTreeMap::new();
        for g in globals {
            if map.contains_key(&g.name) {
                continue;
            }
            let base = sanitize_identifier(&g.name);
            let mut candidate = base.clone();
            let mut n = 2u32;
            while used.contains(&candidate) {
                candidate = format!("{base}{n}");
                n += 1;
            }
            used.insert(candidate.clone());
            map.insert(g.name.clone(), candidate);
        }
        Self { map }
    }

    /// Kotlin name of the global declared as `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/naming.rs"]
mod tests;
