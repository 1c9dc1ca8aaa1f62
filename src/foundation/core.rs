pub use glam::DVec3 as Vec3;

/// RGBA color with channels in `[0, 1]`.
pub type Rgba = [f64; 4];

/// Default carried axis for shape levels and display actions.
pub const DEFAULT_AXIS: Vec3 = Vec3::Y;

/// Return `true` when every component is finite.
pub(crate) fn vec3_is_finite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Clamp a color vector + alpha into a valid RGBA quadruple.
pub(crate) fn rgba_from(color: Vec3, alpha: f64) -> Rgba {
    let c = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    [c(color.x), c(color.y), c(color.z), c(alpha)]
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
