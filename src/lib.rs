#![forbid(unsafe_code)]

//! Procedural particle compositions: a tick-accurate preview engine and a Kotlin
//! code generator that agree on every evaluation rule.
//!
//! Start from a [`Document`] (usually deserialized from JSON), then either step a
//! [`PreviewSession`] or call [`generate`].

pub mod animation;
pub mod compile;
pub mod composition;
pub mod eval;
pub mod expression;
mod foundation;
pub mod session;

pub use compile::{GenerateOpts, Generated, generate};
pub use composition::model::{
    Binding, Card, DisplayAction, Document, GlobalKind, GlobalVar, GrowthAnimate, GrowthConfig,
    LevelKind, ParticleInit, PlaySettings, ScaleHelperConfig, ScaleKind, ShapeLevel, ValueType,
};
pub use eval::scope::{Scope, ScopeBuilder, ScopeRequest};
pub use expression::error::EvalFault;
pub use expression::value::Value;
pub use expression::{evaluate, evaluate_or};
pub use foundation::core::{Rgba, Vec3};
pub use foundation::diagnostics::{Diagnostic, Diagnostics, Severity, SourceLocation};
pub use foundation::error::{ComposerError, ComposerResult};
pub use session::preview::{CardRange, EngineOpts, PreviewFrame, PreviewSession};
