//! Position, rotation and scale in 3D space.
//!
//! [`Transform3D`] is a plain value; register it as a component with
//! `define_component` and attach a serializer pair with
//! [`register_transform`](crate::codec::register_transform) or `register_serde`.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid transform with per-axis scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform3D {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Transform3D {
    /// Origin, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// An unrotated, unit-scale transform at `position`.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Advance the position by `velocity * dt`.
    pub fn integrate(&mut self, velocity: Vec3, dt: f32) {
        self.position += velocity * dt;
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}
