//! # kiln-values
//!
//! Runtime value-passing layer for the Kiln tensor engine.
//!
//! Provides the type-erased [`Value`] container that operators exchange:
//! - Shared, reference-counted payload ownership with a caller-supplied
//!   destruction callback (freed exactly once, on the last release)
//! - Runtime type identity via [`TypeToken`]s minted by a [`TypeRegistry`]
//! - Exact-type and category-checked accessors (tensor, tensor-sequence,
//!   sparse-tensor)
//! - An opaque, shareable [`Fence`] handle for cross-device ordering
//!
//! The container performs no computation and no payload allocation; tensors,
//! allocators, and fence semantics live in the engine crates around it.

pub mod error;
pub mod fence;
pub mod registry;
pub mod value;

pub use error::KilnError;
pub use fence::{Fence, FenceHandle};
pub use registry::{TypeRegistry, TypeToken, ValueKind};
pub use value::{DestroyFn, Value};

pub type Result<T> = std::result::Result<T, KilnError>;
