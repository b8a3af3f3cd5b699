//! Rich diagnostic error types for the polar host layer.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and enough context (offending tag, expected
//! vs. actual kind, class or instance identifier) to diagnose a failure without
//! looking at the wire bytes.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the polar host layer.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller (host application code or an engine callback).
#[derive(Debug, Error, Diagnostic)]
pub enum HostError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Term(#[from] TermError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Class(#[from] ClassError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Operator(#[from] OperatorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Term errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TermError {
    #[error("decode error in {context}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(polar::term::decode),
        help(
            "The wire term does not have the shape its tag requires. \
             Check that the engine and host agree on the term format version."
        )
    )]
    Decode {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("unrecognized tag `{tag}` in {context}")]
    #[diagnostic(
        code(polar::term::unrecognized_tag),
        help(
            "The engine produced a tag the host does not know. \
             Valid value tags are: String, Boolean, Number, List, Dictionary, \
             ExternalInstance, Call, Variable, Expression, Pattern."
        )
    )]
    UnrecognizedTag { tag: String, context: String },

    #[error("unknown operator `{name}`")]
    #[diagnostic(
        code(polar::term::unknown_operator),
        help("Operator names follow the engine grammar, e.g. `Eq`, `Unify`, `And`.")
    )]
    UnknownOperator { name: String },

    #[error("received an Expression from the engine while expression acceptance is disabled")]
    #[diagnostic(
        code(polar::term::expression_not_allowed),
        help(
            "The Expression type is only supported when using data filtering features. \
             Did you perform an operation over an unbound variable in your policy? \
             To receive Expression results, set `accept_expression = true` in the host config."
        )
    )]
    ExpressionNotAllowed,

    #[error("cannot convert map with non-string key `{key}` to a Dictionary")]
    #[diagnostic(
        code(polar::term::non_string_key),
        help("The engine only supports dictionaries with string keys. Convert the keys first.")
    )]
    NonStringKey { key: String },

    /// Part of the engine's error taxonomy. Every [`HostValue`](crate::value::HostValue)
    /// has a wire form, so the codec itself never raises it.
    #[error("unsupported list element at index {index}: {kind}")]
    #[diagnostic(
        code(polar::term::unsupported_list_element),
        help("The list element has no term representation. Convert it to a host value first.")
    )]
    UnsupportedListElement { index: usize, kind: String },

    #[error("malformed term JSON: {message}")]
    #[diagnostic(
        code(polar::term::json),
        help("The input is not valid JSON. Terms are exchanged as one JSON object per term.")
    )]
    Json { message: String },
}

impl TermError {
    /// Shorthand for a [`TermError::Decode`] with the given context.
    pub fn decode(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Decode {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Instance errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InstanceError {
    #[error("unregistered instance: {instance_id}")]
    #[diagnostic(
        code(polar::instance::unregistered),
        help(
            "The engine referenced an instance id the host never registered. \
             Instances are only valid within the session that created them."
        )
    )]
    Unregistered { instance_id: u64 },

    #[error("instance id {instance_id} is already bound to {existing}, cannot rebind to {incoming}")]
    #[diagnostic(
        code(polar::instance::duplicate),
        help("Instance ids are never reused within a session. Allocate a fresh id.")
    )]
    Duplicate {
        instance_id: u64,
        existing: String,
        incoming: String,
    },

    #[error("instance id space exhausted")]
    #[diagnostic(
        code(polar::instance::exhausted),
        help("Every instance id has been handed out. Start a new session.")
    )]
    Exhausted,
}

// ---------------------------------------------------------------------------
// Class errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClassError {
    #[error("unknown class: {name}")]
    #[diagnostic(
        code(polar::class::unknown),
        help("Register the class with the host before referring to it from a policy.")
    )]
    UnknownClass { name: String },

    #[error("cannot construct {class}: {message}")]
    #[diagnostic(
        code(polar::class::constructor),
        help(
            "No registered constructor of `{class}` accepts these arguments. \
             Check the argument count and types used in the policy's `new` call."
        )
    )]
    Constructor { class: String, message: String },

    #[error("class `{name}` is already registered")]
    #[diagnostic(
        code(polar::class::duplicate),
        help("Class names must be unique within a session.")
    )]
    DuplicateClass { name: String },
}

// ---------------------------------------------------------------------------
// Operator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OperatorError {
    #[error("unimplemented operation: {operator}")]
    #[diagnostic(
        code(polar::operator::unimplemented),
        help("The host only evaluates `Eq` over external values.")
    )]
    Unimplemented { operator: String },

    #[error("operator {operator} expects {expected} arguments, got {actual}")]
    #[diagnostic(
        code(polar::operator::arity),
        help("External operators are always binary.")
    )]
    Arity {
        operator: String,
        expected: usize,
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(polar::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(polar::config::write),
        help("Check that the parent directory is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    #[diagnostic(
        code(polar::config::parse),
        help("The config is TOML. Known keys: accept_expression, trace, reject_unregistered_classes.")
    )]
    Parse { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("engine call `{operation}` failed: {message}")]
    #[diagnostic(
        code(polar::engine::call),
        help("The reasoning engine rejected the call. Its message is reported verbatim.")
    )]
    Call { operation: String, message: String },

    #[error("failed to read policy source {path}")]
    #[diagnostic(
        code(polar::engine::source_read),
        help("Check that the policy file exists and is readable.")
    )]
    SourceRead {
        path: String,
        source: std::io::Error,
    },
}

/// Convenience alias for functions returning polar host results.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Result alias for the wire-format reader/writer.
pub type TermResult<T> = std::result::Result<T, TermError>;
