use crate::expression::error::EvalFault;
use crate::foundation::core::Vec3;
use crate::foundation::math::StableHasher;
use serde::Serialize;

/// Runtime value of the script language.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Num(f64),
    Bool(bool),
    Vec3(Vec3),
    /// Result of statements and side-effect-only built-ins.
    Unit,
}

impl Default for Value {
    fn default() -> Self {
        Self::Num(0.0)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Num(_) => "number",
            Self::Bool(_) => "bool",
            Self::Vec3(_) => "vec",
            Self::Unit => "unit",
        }
    }

    pub fn as_f64(&self) -> Result<f64, EvalFault> {
        match *self {
            Self::Num(v) => Ok(v),
            other => Err(EvalFault::type_error(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_vec3(&self) -> Result<Vec3, EvalFault> {
        match *self {
            Self::Vec3(v) => Ok(v),
            other => Err(EvalFault::type_error(format!(
                "expected vec, got {}",
                other.type_name()
            ))),
        }
    }

    /// Condition truthiness: bools as-is, numbers are true when non-zero.
    pub fn truthy(&self) -> Result<bool, EvalFault> {
        match *self {
            Self::Bool(b) => Ok(b),
            Self::Num(v) => Ok(v != 0.0 && !v.is_nan()),
            other => Err(EvalFault::type_error(format!(
                "expected bool, got {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn hash_into(&self, h: &mut StableHasher) {
        match *self {
            Self::Num(v) => {
                h.write_u8(0);
                h.write_f64(v);
            }
            Self::Bool(b) => {
                h.write_u8(1);
                h.write_bool(b);
            }
            Self::Vec3(v) => {
                h.write_u8(2);
                h.write_vec3(v);
            }
            Self::Unit => h.write_u8(3),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Num(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec3> for Value {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}
