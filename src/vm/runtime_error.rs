/// Build a runtime error of the given kind, report it together with the
/// call stack, and evaluate to the error value.
///
/// Macro for borrow checking reasons.
macro_rules! runtime_error {
    ($self:ident, $kind:ident, $($arg:expr),* $(,)?) => {{
        let error = $crate::vm::error::RuntimeError::$kind(format!($($arg),*));
        eprintln!("Error: {error}");
        $self.print_stack_trace();
        error
    }};
}
