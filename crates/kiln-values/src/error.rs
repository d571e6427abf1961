use thiserror::Error;

/// Errors raised by the value-passing layer.
#[derive(Debug, Error)]
pub enum KilnError {
    /// A typed or categorized accessor was called on a value whose stored
    /// type does not satisfy the requested contract. This is a programming
    /// error in the calling operation, not a recoverable condition.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A kind name was registered twice with a different runtime
    /// representation or category.
    #[error("value kind '{name}' already registered with a different representation")]
    TypeRedefinition { name: String },
}

impl KilnError {
    pub(crate) fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        KilnError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
