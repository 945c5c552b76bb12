//! Runtime error taxonomy.

use thiserror::Error;

/// The kinds of errors that terminate a running program.
///
/// The message is fully rendered at the raise site; the kind mostly serves
/// tests and keeps the reporting uniform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Arithmetic on incompatible kinds, calls of non-callables, member
    /// access on unsupported values, writes to immutable objects.
    #[error("{0}")]
    Type(String),
    /// A callable was invoked with the wrong number of arguments.
    #[error("{0}")]
    Arity(String),
    /// An undefined global, member or method was referenced.
    #[error("{0}")]
    Name(String),
    /// A top-level return produced something other than an int.
    #[error("{0}")]
    TopLevelReturn(String),
}
