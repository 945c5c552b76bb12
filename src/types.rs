//! Collection of small utility types.

use shrinkwraprs::Shrinkwrap;

#[derive(Shrinkwrap, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
#[shrinkwrap(mutable)]
pub struct Line(pub usize);

impl Default for Line {
    fn default() -> Self {
        Self(1)
    }
}

/// A position in the source text.
///
/// Attached to every token and AST node and recorded, run-length encoded,
/// for every emitted bytecode byte so that runtime errors can point back
/// at the source.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct Span {
    pub line: Line,
    pub column: usize,
}

impl Span {
    #[must_use]
    pub const fn new(line: Line, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", *self.line, self.column)
    }
}
