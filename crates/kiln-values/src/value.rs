use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::error::KilnError;
use crate::fence::FenceHandle;
use crate::registry::{TypeToken, ValueKind};
use crate::Result;

/// Destruction callback for a type-erased payload.
///
/// Supplied by whoever allocated the payload; invoked with the original raw
/// pointer exactly once, when the last owning [`Value`] is released.
pub type DestroyFn = unsafe fn(*mut ());

/// Owning handle to a type-erased payload block.
///
/// Dropping the last `Arc<Payload>` runs the destroyer. The payload never
/// outlives its destroyer because both live in the same allocation.
struct Payload {
    ptr: *mut (),
    destroy: DestroyFn,
}

impl Drop for Payload {
    fn drop(&mut self) {
        tracing::trace!(ptr = ?self.ptr, "releasing value payload");
        // Safety: `ptr` was handed to us together with `destroy` by the
        // initializer, which promises the pair is valid and that the
        // destroyer runs at most once. This is the only call site.
        unsafe { (self.destroy)(self.ptr) };
    }
}

// Safety: values flow between worker threads, so the initializer's contract
// requires the pointee to be Send + Sync. The container itself never reads
// or writes through `ptr`.
unsafe impl Send for Payload {}
unsafe impl Sync for Payload {}

/// Type-erased, reference-counted value passed between computation steps.
///
/// A `Value` either holds a payload together with the [`TypeToken`] of its
/// kind, or is empty; there is no in-between state. Cloning shares the
/// payload (a refcount increment): the payload itself is never copied, and
/// is freed exactly once, when the last owning clone drops.
///
/// Access is type-checked at runtime: [`Value::get`] requires the stored
/// kind's representation to be exactly `T`, while the category accessors
/// ([`Value::tensor`] and friends) accept any kind in the category, since
/// each category shares a single concrete representation.
///
/// The optional fence orders cross-device access to the payload *contents*;
/// the container stores and propagates it but never interprets it, and
/// provides no content-level locking of its own.
#[derive(Clone, Default)]
pub struct Value {
    payload: Option<Arc<Payload>>,
    token: Option<TypeToken>,
    fence: Option<FenceHandle>,
}

impl Value {
    /// Create an empty value: no payload, no type, no fence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a value that owns `ptr` as a payload of kind `token`.
    ///
    /// # Safety
    ///
    /// - `ptr` must point to a live instance of `token`'s concrete
    ///   representation, and `destroy(ptr)` must be the correct way to free
    ///   it, callable at most once.
    /// - The pointee must be safe to share and send across threads
    ///   (`Send + Sync`): clones of this value may land on any worker.
    /// - Nothing else may free `ptr`; ownership transfers here.
    pub unsafe fn from_raw(ptr: *mut (), token: TypeToken, destroy: DestroyFn) -> Self {
        let mut value = Self::new();
        value.initialize(ptr, token, destroy);
        value
    }

    /// Replace this value's payload with `ptr`, of kind `token`.
    ///
    /// The previously held payload reference (if any) is released as part
    /// of the replacement; its destroyer runs if this was the last
    /// reference. The fence is left untouched.
    ///
    /// # Safety
    ///
    /// Same contract as [`Value::from_raw`].
    pub unsafe fn initialize(&mut self, ptr: *mut (), token: TypeToken, destroy: DestroyFn) {
        tracing::trace!(kind = token.describe(), "initializing value payload");
        self.payload = Some(Arc::new(Payload { ptr, destroy }));
        self.token = Some(token);
    }

    /// Safe constructor: box `value` and own it as a payload of kind
    /// `token`.
    ///
    /// Fails with a type mismatch if `token`'s registered representation is
    /// not `T`, so an accepted value can always be read back with the typed
    /// accessors.
    pub fn from_typed<T: Send + Sync + 'static>(value: T, token: TypeToken) -> Result<Self> {
        if token.repr_id() != TypeId::of::<T>() {
            return Err(KilnError::mismatch(
                token.describe(),
                std::any::type_name::<T>(),
            ));
        }
        let ptr = Box::into_raw(Box::new(value)) as *mut ();
        // Safety: `ptr` came from `Box::new::<T>` and the matching
        // destroyer reconstructs the box; the repr check above ties `T` to
        // `token`, and `T: Send + Sync` covers the threading contract.
        Ok(unsafe { Self::from_raw(ptr, token, drop_boxed::<T>) })
    }

    /// Whether this value holds a payload (and therefore a type).
    pub fn is_allocated(&self) -> bool {
        self.payload.is_some() && self.token.is_some()
    }

    /// The kind of the stored payload, or `None` when empty.
    pub fn token(&self) -> Option<TypeToken> {
        self.token
    }

    /// Borrow the payload as a `T`. Requires the stored kind's concrete
    /// representation to be exactly `T`.
    pub fn get<T: 'static>(&self) -> Result<&T> {
        let ptr = self.checked_ptr::<T>()?;
        // Safety: checked_ptr verified the payload's representation is `T`;
        // the borrow of self keeps the owning Arc alive.
        Ok(unsafe { &*(ptr as *const T) })
    }

    /// Raw mutable pointer to the payload as a `T`.
    ///
    /// The container does not serialize access to payload contents;
    /// dereferencing is only safe when the engine has ordered access, e.g.
    /// by waiting on this value's fence. Type checking is the same as
    /// [`Value::get`].
    pub fn get_mut_ptr<T: 'static>(&self) -> Result<*mut T> {
        self.checked_ptr::<T>()
    }

    /// Borrow the payload as the tensor category's representation `T`.
    ///
    /// Unlike [`Value::get`], any kind in the tensor category is accepted;
    /// callers need not know which element-type token the producer used.
    pub fn tensor<T: 'static>(&self) -> Result<&T> {
        let ptr = self.checked_category_ptr::<T>(ValueKind::Tensor)?;
        // Safety: category check verified the stored representation is `T`.
        Ok(unsafe { &*(ptr as *const T) })
    }

    /// Mutable-pointer variant of [`Value::tensor`].
    pub fn tensor_mut_ptr<T: 'static>(&self) -> Result<*mut T> {
        self.checked_category_ptr::<T>(ValueKind::Tensor)
    }

    /// Borrow the payload as the tensor-sequence category's representation.
    pub fn tensor_sequence<T: 'static>(&self) -> Result<&T> {
        let ptr = self.checked_category_ptr::<T>(ValueKind::TensorSequence)?;
        // Safety: as in `tensor`.
        Ok(unsafe { &*(ptr as *const T) })
    }

    /// Mutable-pointer variant of [`Value::tensor_sequence`].
    pub fn tensor_sequence_mut_ptr<T: 'static>(&self) -> Result<*mut T> {
        self.checked_category_ptr::<T>(ValueKind::TensorSequence)
    }

    /// Borrow the payload as the sparse-tensor category's representation.
    pub fn sparse_tensor<T: 'static>(&self) -> Result<&T> {
        let ptr = self.checked_category_ptr::<T>(ValueKind::SparseTensor)?;
        // Safety: as in `tensor`.
        Ok(unsafe { &*(ptr as *const T) })
    }

    /// Mutable-pointer variant of [`Value::sparse_tensor`].
    pub fn sparse_tensor_mut_ptr<T: 'static>(&self) -> Result<*mut T> {
        self.checked_category_ptr::<T>(ValueKind::SparseTensor)
    }

    /// Whether the stored kind is in the dense-tensor category.
    pub fn is_tensor(&self) -> bool {
        self.token.map_or(false, |t| t.is_tensor_type())
    }

    /// Whether the stored kind is in the tensor-sequence category.
    pub fn is_tensor_sequence(&self) -> bool {
        self.token.map_or(false, |t| t.is_tensor_sequence_type())
    }

    /// Whether the stored kind is in the sparse-tensor category.
    pub fn is_sparse_tensor(&self) -> bool {
        self.token.map_or(false, |t| t.is_sparse_tensor_type())
    }

    /// The fence currently attached to this value, if any.
    pub fn fence(&self) -> Option<&FenceHandle> {
        self.fence.as_ref()
    }

    /// Attach (or clear) the fence. No effect on payload ownership or type.
    pub fn set_fence(&mut self, fence: Option<FenceHandle>) {
        self.fence = fence;
    }

    /// Adopt `other`'s fence, so both values order against the same
    /// dependency. Payload ownership and type are untouched on both sides.
    pub fn share_fence_with(&mut self, other: &Value) {
        self.fence = other.fence.clone();
    }

    fn checked_ptr<T: 'static>(&self) -> Result<*mut T> {
        match (&self.payload, self.token) {
            (Some(payload), Some(token)) => {
                if token.repr_id() == TypeId::of::<T>() {
                    Ok(payload.ptr as *mut T)
                } else {
                    Err(KilnError::mismatch(
                        std::any::type_name::<T>(),
                        token.describe(),
                    ))
                }
            }
            _ => Err(KilnError::mismatch(
                std::any::type_name::<T>(),
                "unallocated value",
            )),
        }
    }

    fn checked_category_ptr<T: 'static>(&self, category: ValueKind) -> Result<*mut T> {
        match (&self.payload, self.token) {
            (Some(payload), Some(token)) => {
                if token.kind() != category {
                    return Err(KilnError::mismatch(
                        category.to_string(),
                        token.describe(),
                    ));
                }
                if token.repr_id() != TypeId::of::<T>() {
                    return Err(KilnError::mismatch(
                        std::any::type_name::<T>(),
                        token.describe(),
                    ));
                }
                Ok(payload.ptr as *mut T)
            }
            _ => Err(KilnError::mismatch(
                category.to_string(),
                "unallocated value",
            )),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("kind", &self.token.map(|t| t.describe().to_string()))
            .field("allocated", &self.is_allocated())
            .field("has_fence", &self.fence.is_some())
            .finish()
    }
}

/// Destroyer used by [`Value::from_typed`]: reconstruct and drop the box.
unsafe fn drop_boxed<T>(ptr: *mut ()) {
    drop(Box::from_raw(ptr as *mut T));
}
