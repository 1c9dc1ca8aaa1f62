use crate::foundation::core::Vec3;
use glam::DQuat;
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x6a1f_03c5_92b4_e7d1;

/// Stable, platform-independent hasher used for structural signatures and cache keys.
///
/// Floats are hashed by bit pattern, strings by length + bytes, so two values hash equal
/// only when they are structurally identical.
pub(crate) struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    pub(crate) fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub(crate) fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_f64(&mut self, v: f64) {
        // Collapse -0.0 into 0.0 so equal values hash equal.
        let v = if v == 0.0 { 0.0 } else { v };
        self.write_u64(v.to_bits());
    }

    pub(crate) fn write_vec3(&mut self, v: Vec3) {
        self.write_f64(v.x);
        self.write_f64(v.y);
        self.write_f64(v.z);
    }

    pub(crate) fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    pub(crate) fn finish(&self) -> u64 {
        self.inner.digest()
    }
}

/// Rotate `point` by the shortest arc that carries `from` onto `to`.
///
/// Degenerate (zero-length or non-finite) directions leave the point unchanged.
pub(crate) fn rotate_to_direction(point: Vec3, from: Vec3, to: Vec3) -> Vec3 {
    let (Some(from), Some(to)) = (from.try_normalize(), to.try_normalize()) else {
        return point;
    };
    DQuat::from_rotation_arc(from, to) * point
}

/// Rotate `point` around `axis` by `angle` radians (right-handed).
pub(crate) fn rotate_around_axis(point: Vec3, axis: Vec3, angle: f64) -> Vec3 {
    let Some(axis) = axis.try_normalize() else {
        return point;
    };
    if !angle.is_finite() {
        return point;
    }
    DQuat::from_axis_angle(axis, angle) * point
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
