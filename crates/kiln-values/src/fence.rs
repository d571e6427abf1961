use std::fmt;
use std::sync::Arc;

/// Marker trait for execution-provider synchronization objects.
///
/// A fence represents a cross-device ordering dependency: a producer signals
/// it when a payload is ready, a consumer on another stream waits on it
/// before touching the payload. That protocol lives entirely in the
/// execution providers; the value layer only stores and propagates the
/// handle, and never calls into it.
pub trait Fence: Send + Sync + fmt::Debug {}

/// Shared handle to a fence. Freely cloneable; sharing a fence has no effect
/// on payload ownership.
pub type FenceHandle = Arc<dyn Fence>;
