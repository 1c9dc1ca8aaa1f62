//! Kotlin code generation.
//!
//! One class per document: global fields, an `init` block, the element map
//! returned by `getParticles()` and the per-tick action list in `onTick()`.

pub mod codegen;
pub mod naming;
pub(crate) mod transpile;

use crate::foundation::diagnostics::Diagnostics;
use serde::{Deserialize, Serialize};

pub use codegen::generate;

/// Options for [`generate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOpts {
    /// Generated class name. Defaults to the PascalCased document name plus
    /// `Composition`.
    pub class_name: Option<String>,
    /// Kotlin package of the generated file; omitted when empty.
    pub package: String,
    /// Passes of the `init` fixed point for globals that read later globals.
    pub max_global_passes: usize,
}

impl Default for GenerateOpts {
    fn default() -> Self {
        Self {
            class_name: None,
            package: "generated.particles".to_owned(),
            max_global_passes: 8,
        }
    }
}

/// Output of one generation pass.
#[derive(Clone, Debug)]
pub struct Generated {
    pub source: String,
    pub diagnostics: Diagnostics,
}
