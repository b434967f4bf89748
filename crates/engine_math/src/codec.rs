//! Fixed-width byte encodings for spatial values.
//!
//! Vectors are three little-endian `f32`s, quaternions four (`x, y, z, w`),
//! a [`Transform3D`] is position, rotation, scale in that order (40 bytes).

use engine_component::{ByteReader, ByteWriter, CodecError, ComponentDef, EngineError, Registry};
use glam::{Quat, Vec3};

use crate::transform::Transform3D;

/// Encoded size of a [`Transform3D`] in bytes.
pub const TRANSFORM_SIZE: usize = 40;

/// Write `v` as three `f32`s.
pub fn write_vec3(writer: &mut ByteWriter, v: Vec3) {
    for component in v.to_array() {
        writer.write_f32(component);
    }
}

/// Read three `f32`s as a vector.
///
/// # Errors
///
/// [`CodecError::UnexpectedEof`] if fewer than 12 bytes remain.
pub fn read_vec3(reader: &mut ByteReader<'_>) -> Result<Vec3, CodecError> {
    Ok(Vec3::new(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?))
}

/// Write `q` as four `f32`s.
pub fn write_quat(writer: &mut ByteWriter, q: Quat) {
    for component in q.to_array() {
        writer.write_f32(component);
    }
}

/// Read four `f32`s as a quaternion. The value is not re-normalized.
///
/// # Errors
///
/// [`CodecError::UnexpectedEof`] if fewer than 16 bytes remain.
pub fn read_quat(reader: &mut ByteReader<'_>) -> Result<Quat, CodecError> {
    Ok(Quat::from_xyzw(
        reader.read_f32()?,
        reader.read_f32()?,
        reader.read_f32()?,
        reader.read_f32()?,
    ))
}

/// Write a full transform.
///
/// # Errors
///
/// Never fails; the signature matches a serializer pair.
pub fn write_transform(transform: &Transform3D, writer: &mut ByteWriter) -> Result<(), CodecError> {
    write_vec3(writer, transform.position);
    write_quat(writer, transform.rotation);
    write_vec3(writer, transform.scale);
    Ok(())
}

/// Read a full transform.
///
/// # Errors
///
/// [`CodecError::UnexpectedEof`] on truncated input.
pub fn read_transform(reader: &mut ByteReader<'_>) -> Result<Transform3D, CodecError> {
    Ok(Transform3D {
        position: read_vec3(reader)?,
        rotation: read_quat(reader)?,
        scale: read_vec3(reader)?,
    })
}

/// Attach the fixed-width transform serializer pair to `def`.
///
/// # Errors
///
/// Whatever [`Registry::register_serializer_pair`] returns.
pub fn register_transform<A: 'static>(
    registry: &mut Registry,
    def: &ComponentDef<Transform3D, A>,
) -> Result<(), EngineError> {
    registry.register_serializer_pair(def, write_transform, read_transform)
}
