//! # engine_math
//!
//! Spatial types for the simulation core. Re-exports the [`glam`] vector types
//! it uses, defines [`Transform3D`], and provides byte-codec helpers so
//! spatial components can carry compact serializer pairs.

pub mod codec;
pub mod transform;

pub use glam::{Quat, Vec3};

pub use codec::{
    read_quat, read_transform, read_vec3, register_transform, write_quat, write_transform,
    write_vec3,
};
pub use transform::Transform3D;
