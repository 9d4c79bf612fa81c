//! Scene-to-GPU acceleration-structure pipeline: per-mesh triangle geometry
//! registration, hardware instance records, and the one-shot build that
//! produces the two-level spatial index the ray-tracing pipeline binds.

pub mod build;
pub mod geometry;
pub mod instances;

pub use build::{declare, BuiltStructures, DeclaredStructures};
pub use geometry::{GeometryRegistry, MeshHandle};
pub use instances::{build_instances, AttributeBindings, InstanceRecord, MeshBinding};
