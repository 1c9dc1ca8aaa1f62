/// Convenience result type used across particle-composer.
pub type ComposerResult<T> = Result<T, ComposerError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Expression faults never surface here during preview; they are recovered locally and
/// reported through [`crate::Diagnostics`]. This type covers the faults that refuse work.
#[derive(thiserror::Error, Debug)]
pub enum ComposerError {
    /// Invalid user-provided document or option data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A card whose structure cannot be evaluated (e.g. nesting below a `single` level).
    #[error("structure error: {0}")]
    Structure(String),

    /// An embedded script that cannot be parsed or resolved.
    #[error("expression error: {0}")]
    Expression(String),

    /// Errors while emitting compiled source.
    #[error("generation error: {0}")]
    Generation(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ComposerError {
    /// Build a [`ComposerError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ComposerError::Structure`] value.
    pub fn structure(msg: impl Into<String>) -> Self {
        Self::Structure(msg.into())
    }

    /// Build a [`ComposerError::Expression`] value.
    pub fn expression(msg: impl Into<String>) -> Self {
        Self::Expression(msg.into())
    }

    /// Build a [`ComposerError::Generation`] value.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Build a [`ComposerError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for ComposerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
