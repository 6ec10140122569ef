//! Error types for the patch algebra.

use thiserror::Error;

/// Result type for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors that can occur while normalizing or applying an update operation.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The operation names an operator outside the recognized set.
    #[error("unknown update operator: {name}")]
    UnknownOperator {
        /// The offending operator name.
        name: String,
    },

    /// The operation mixes `$`-operator keys with bare field keys.
    #[error("update operation mixes operator keys with plain field keys")]
    MixedOperation,

    /// An update operation (or an operator's argument map) was not an object.
    #[error("expected an object for {context}")]
    NotAnObject {
        /// What was being parsed when the non-object was found.
        context: String,
    },

    /// A document path could not be parsed.
    #[error("invalid document path `{path}`: {message}")]
    InvalidPath {
        /// The raw path string.
        path: String,
        /// Description of the syntax problem.
        message: String,
    },

    /// An operator received an argument it cannot work with.
    #[error("invalid argument for {op} at `{path}`: {message}")]
    InvalidArgument {
        /// The operator name.
        op: &'static str,
        /// The document path.
        path: String,
        /// Description of the problem.
        message: String,
    },

    /// An arithmetic operator hit a null or missing operand.
    #[error("{op} operand at `{path}` must not be null")]
    NullOperand {
        /// The operator name.
        op: &'static str,
        /// The document path.
        path: String,
    },

    /// The document value at a path has the wrong type for the operator.
    #[error("type mismatch at `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        /// The document path.
        path: String,
        /// The type the operator requires.
        expected: &'static str,
        /// The type actually present.
        found: &'static str,
    },

    /// `$rename` targeted an element of an array.
    #[error("$rename is undefined for array elements at `{path}`")]
    RenameIntoArray {
        /// The document path.
        path: String,
    },

    /// A `$pull` regex condition failed to compile.
    #[error("invalid regex `{pattern}`: {message}")]
    BadRegex {
        /// The regex pattern.
        pattern: String,
        /// The compile error.
        message: String,
    },

    /// Operation (de)serialization failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl PatchError {
    /// Creates an unknown-operator error.
    pub fn unknown_operator(name: impl Into<String>) -> Self {
        Self::UnknownOperator { name: name.into() }
    }

    /// Creates a not-an-object error.
    pub fn not_an_object(context: impl Into<String>) -> Self {
        Self::NotAnObject {
            context: context.into(),
        }
    }

    /// Creates an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(
        op: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            op,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a type-mismatch error.
    pub fn type_mismatch(path: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected,
            found,
        }
    }
}

impl From<serde_json::Error> for PatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
