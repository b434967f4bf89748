//! # engine_component
//!
//! The static schema of the simulation core: what an entity is, which kinds
//! of components and resources exist, and how component values are turned
//! into bytes for the network layer.
//!
//! This crate provides:
//!
//! - [`Entity`]: lightweight `u64` entity identifiers.
//! - [`EntityAllocator`]: monotonically increasing ID allocator.
//! - [`ComponentDef`] / [`ResourceDef`]: typed handles returned by registration.
//! - [`Registry`]: the closeable name/kind table all definitions live in.
//! - [`QueryKey`]: canonical, order-independent required-component sets.
//! - [`ByteWriter`] / [`ByteReader`]: the cursor serializer pairs operate on.
//! - [`EngineError`]: the fail-fast error taxonomy shared by every crate.

pub mod codec;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod registry;
pub mod resource;

pub use codec::{ByteReader, ByteWriter, CodecError};
pub use component::{ComponentDef, ComponentKindId};
pub use entity::{Entity, EntityAllocator};
pub use error::EngineError;
pub use query::QueryKey;
pub use registry::{ComponentInfo, Registry};
pub use resource::{ResourceDef, ResourceKindId};
