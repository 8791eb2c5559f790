//! Error handling and result types for PhTree operations.
//!
//! Lookups and removals of missing keys are not errors: they return `None`.
//! The error type covers misuse that the checked `try_*` API reports instead
//! of panicking, invalid configuration, and integrity violations found by the
//! validation layer.

/// Error type for PH-tree operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PhTreeError {
    /// Key not found in the tree.
    KeyNotFound,
    /// The target key of an update is already occupied by another entry.
    KeyCollision,
    /// A key or query bound has the wrong number of coordinates.
    DimensionMismatch { expected: usize, actual: usize },
    /// Invalid dimensionality requested at construction.
    InvalidDimensions(String),
    /// Invalid configuration value.
    InvalidConfig(String),
    /// Internal data structure integrity violation.
    DataIntegrityError(String),
    /// Arena operation failed.
    ArenaError(String),
}

impl PhTreeError {
    /// Create a DimensionMismatch error
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create an InvalidDimensions error with context
    pub fn invalid_dimensions(dims: usize, max: usize) -> Self {
        Self::InvalidDimensions(format!(
            "Dimensionality {} is invalid (supported: 1..={})",
            dims, max
        ))
    }

    /// Create an InvalidConfig error with context
    pub fn invalid_config(field: &str, details: &str) -> Self {
        Self::InvalidConfig(format!("{}: {}", field, details))
    }

    /// Create a DataIntegrityError with context
    pub fn data_integrity(context: &str, details: &str) -> Self {
        Self::DataIntegrityError(format!("{}: {}", context, details))
    }

    /// Create an ArenaError with context
    pub fn arena_error(operation: &str, details: &str) -> Self {
        Self::ArenaError(format!("{} failed: {}", operation, details))
    }

    /// Check if this error reports a wrong key length
    pub fn is_dimension_error(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::InvalidDimensions(_))
    }
}

impl std::fmt::Display for PhTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhTreeError::KeyNotFound => write!(f, "Key not found in tree"),
            PhTreeError::KeyCollision => write!(f, "Target key is already present in tree"),
            PhTreeError::DimensionMismatch { expected, actual } => write!(
                f,
                "Dimension mismatch: expected {} coordinates, got {}",
                expected, actual
            ),
            PhTreeError::InvalidDimensions(msg) => write!(f, "Invalid dimensions: {}", msg),
            PhTreeError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            PhTreeError::DataIntegrityError(msg) => write!(f, "Data integrity error: {}", msg),
            PhTreeError::ArenaError(msg) => write!(f, "Arena error: {}", msg),
        }
    }
}

impl std::error::Error for PhTreeError {}

/// Public result type for tree operations that may fail
pub type PhTreeResult<T> = Result<T, PhTreeError>;

/// Result type for key lookup operations
pub type KeyResult<T> = Result<T, PhTreeError>;

/// Result type for tree modification operations
pub type ModifyResult<T> = Result<T, PhTreeError>;

/// Result type for tree construction and validation
pub type InitResult<T> = Result<T, PhTreeError>;

/// Result extension trait for improved error handling
pub trait PhTreeResultExt<T> {
    /// Prefix the error message with additional context
    fn with_context(self, context: &str) -> PhTreeResult<T>;

    /// Prefix the error message with the name of the failing operation
    fn with_operation(self, operation: &str) -> PhTreeResult<T>;
}

impl<T> PhTreeResultExt<T> for Result<T, PhTreeError> {
    fn with_context(self, context: &str) -> PhTreeResult<T> {
        self.map_err(|e| match e {
            PhTreeError::InvalidDimensions(msg) => {
                PhTreeError::InvalidDimensions(format!("{}: {}", context, msg))
            }
            PhTreeError::InvalidConfig(msg) => PhTreeError::invalid_config(context, &msg),
            PhTreeError::DataIntegrityError(msg) => PhTreeError::data_integrity(context, &msg),
            PhTreeError::ArenaError(msg) => PhTreeError::arena_error(context, &msg),
            other => other,
        })
    }

    fn with_operation(self, operation: &str) -> PhTreeResult<T> {
        self.with_context(&format!("Operation '{}'", operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            PhTreeError::dimension_mismatch(3, 2).to_string(),
            "Dimension mismatch: expected 3 coordinates, got 2"
        );
        assert_eq!(
            PhTreeError::invalid_dimensions(0, 62).to_string(),
            "Invalid dimensions: Dimensionality 0 is invalid (supported: 1..=62)"
        );
        assert_eq!(PhTreeError::KeyNotFound.to_string(), "Key not found in tree");
    }

    #[test]
    fn test_with_context_keeps_unit_variants() {
        let err: PhTreeResult<()> = Err(PhTreeError::KeyCollision);
        assert_eq!(err.with_context("update"), Err(PhTreeError::KeyCollision));

        let err: PhTreeResult<()> = Err(PhTreeError::data_integrity("node 3", "empty"));
        assert_eq!(
            err.with_operation("validate"),
            Err(PhTreeError::DataIntegrityError(
                "Operation 'validate': node 3: empty".to_string()
            ))
        );
    }

    #[test]
    fn test_is_dimension_error() {
        assert!(PhTreeError::dimension_mismatch(2, 3).is_dimension_error());
        assert!(!PhTreeError::KeyNotFound.is_dimension_error());
    }
}
