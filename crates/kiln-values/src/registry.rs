use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::ptr;

use parking_lot::RwLock;

use crate::error::KilnError;
use crate::Result;

/// Category of a registered value kind.
///
/// Three categories are polymorphic: many kinds may share the category
/// (e.g. `tensor<f32>` and `tensor<i64>` are distinct kinds, both in the
/// `Tensor` category) while every kind in a category shares a single
/// concrete runtime representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Dense tensor.
    Tensor,
    /// Sequence of tensors.
    TensorSequence,
    /// Sparse tensor.
    SparseTensor,
    /// Any other registered kind (maps, strings, custom op state, ...).
    Opaque,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Tensor => write!(f, "tensor"),
            ValueKind::TensorSequence => write!(f, "tensor_seq"),
            ValueKind::SparseTensor => write!(f, "sparse_tensor"),
            ValueKind::Opaque => write!(f, "opaque"),
        }
    }
}

/// Immutable descriptor backing a [`TypeToken`].
#[derive(Debug)]
struct TypeInfo {
    name: String,
    kind: ValueKind,
    /// `TypeId` of the Rust type actually stored in a payload of this kind.
    /// Kinds in the same category share this (one representation per
    /// category); it is what makes type-erased downcasts checkable.
    repr: TypeId,
}

/// Opaque, process-wide-unique identity for a registered value kind.
///
/// Tokens are compared by identity, not by structural equality: two tokens
/// are equal iff they came from the same registration. A token stays valid
/// for the lifetime of the process, independent of the registry that minted
/// it.
#[derive(Clone, Copy)]
pub struct TypeToken(&'static TypeInfo);

impl TypeToken {
    /// Human-readable name given at registration, for diagnostics.
    pub fn describe(&self) -> &str {
        &self.0.name
    }

    /// Category of this kind.
    pub fn kind(&self) -> ValueKind {
        self.0.kind
    }

    /// Whether this kind is in the dense-tensor category.
    pub fn is_tensor_type(&self) -> bool {
        self.0.kind == ValueKind::Tensor
    }

    /// Whether this kind is in the tensor-sequence category.
    pub fn is_tensor_sequence_type(&self) -> bool {
        self.0.kind == ValueKind::TensorSequence
    }

    /// Whether this kind is in the sparse-tensor category.
    pub fn is_sparse_tensor_type(&self) -> bool {
        self.0.kind == ValueKind::SparseTensor
    }

    /// `TypeId` of the concrete Rust representation stored for this kind.
    pub(crate) fn repr_id(&self) -> TypeId {
        self.0.repr
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.0, other.0)
    }
}

impl Eq for TypeToken {}

impl std::hash::Hash for TypeToken {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        ptr::hash(self.0, state);
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeToken")
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .finish()
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// Registry of value kinds known to the engine.
///
/// The engine constructs one registry at startup, registers every kind its
/// operators exchange, and hands out the resulting tokens. Registration is
/// idempotent per name; callers are expected to cache tokens rather than
/// look them up on hot paths.
///
/// Thread-safe: share as `Arc<TypeRegistry>` across worker threads.
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, TypeToken>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register `name` as a value kind stored as `T`, returning its token.
    ///
    /// Registering the same name again with the same `T` and kind returns
    /// the original token. A name re-registered with a different `T` or a
    /// different kind is an error.
    pub fn register<T: 'static>(&self, name: &str, kind: ValueKind) -> Result<TypeToken> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(name) {
            if existing.repr_id() == TypeId::of::<T>() && existing.kind() == kind {
                return Ok(*existing);
            }
            return Err(KilnError::TypeRedefinition {
                name: name.to_string(),
            });
        }

        // Leaked: tokens must stay valid for the process lifetime,
        // independent of registry teardown.
        let info: &'static TypeInfo = Box::leak(Box::new(TypeInfo {
            name: name.to_string(),
            kind,
            repr: TypeId::of::<T>(),
        }));
        let token = TypeToken(info);
        entries.insert(name.to_string(), token);
        tracing::debug!(name, %kind, "registered value kind");
        Ok(token)
    }

    /// Look up a previously registered kind by name.
    pub fn lookup(&self, name: &str) -> Option<TypeToken> {
        self.entries.read().get(name).copied()
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no kinds have been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct DenseTensor;
    struct TensorSeq;

    #[test]
    fn test_register_and_lookup() {
        let reg = TypeRegistry::new();
        let t = reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap();
        assert_eq!(reg.lookup("tensor<f32>"), Some(t));
        assert_eq!(reg.lookup("tensor<i64>"), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_idempotent() {
        let reg = TypeRegistry::new();
        let a = reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap();
        let b = reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_distinct_kinds_distinct_tokens() {
        let reg = TypeRegistry::new();
        let a = reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap();
        let b = reg.register::<DenseTensor>("tensor<i64>", ValueKind::Tensor).unwrap();
        assert_ne!(a, b);
        assert!(a.is_tensor_type() && b.is_tensor_type());
    }

    #[test]
    fn test_redefinition_rejected() {
        let reg = TypeRegistry::new();
        reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap();
        let err = reg.register::<TensorSeq>("tensor<f32>", ValueKind::Tensor);
        assert!(matches!(err, Err(KilnError::TypeRedefinition { .. })));
        let err = reg.register::<DenseTensor>("tensor<f32>", ValueKind::Opaque);
        assert!(matches!(err, Err(KilnError::TypeRedefinition { .. })));
    }

    #[test]
    fn test_category_predicates() {
        let reg = TypeRegistry::new();
        let t = reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap();
        let s = reg.register::<TensorSeq>("seq<tensor>", ValueKind::TensorSequence).unwrap();
        let m = reg.register::<String>("map<string>", ValueKind::Opaque).unwrap();
        assert!(t.is_tensor_type());
        assert!(!t.is_tensor_sequence_type());
        assert!(s.is_tensor_sequence_type());
        assert!(!m.is_tensor_type() && !m.is_sparse_tensor_type());
    }

    #[test]
    fn test_describe() {
        let reg = TypeRegistry::new();
        let t = reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap();
        assert_eq!(t.describe(), "tensor<f32>");
        assert_eq!(format!("{}", t), "tensor<f32>");
    }

    #[test]
    fn test_concurrent_registration() {
        let reg = Arc::new(TypeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    reg.register::<DenseTensor>("tensor<f32>", ValueKind::Tensor).unwrap()
                })
            })
            .collect();
        let tokens: Vec<TypeToken> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(tokens.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(reg.len(), 1);
    }
}
