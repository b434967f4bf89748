//! # engine_world
//!
//! Runtime state of the simulation core.
//!
//! - [`World`]: the entity store. Owns entity identity, per-entity component
//!   tables, and the schema [`Registry`](engine_component::Registry).
//! - [`QueryCache`]: memoized required-set → entity lists, updated in the
//!   same call that attaches or detaches a component.
//! - [`Resources`]: singleton values, dependency-ordered construction, and
//!   [`WhenResources`] futures for cross-tick waits.

pub mod query_cache;
pub mod resources;
pub mod world;

pub use query_cache::{QueryCache, QueryHandle};
pub use resources::{Resources, WhenResources};
pub use world::World;
