//! Shared domain types for the cubegate query gateway.
//!
//! These types cross the boundary between the HTTP facade and the downstream
//! query processor: the canonical query representation, the engine
//! enumeration, the registry catalog used for schema resolution, and the
//! per-request bucketing context.

pub mod context;
pub mod query;
pub mod registry;

pub use context::BucketContext;
pub use query::{CubeQuery, Engine, ResultModel};
pub use registry::{CatalogError, RegistryCatalog};
