use super::VM;
use crate::chunk::CodeOffset;

impl VM {
    /// Run a collection if the heap asks for one (or unconditionally in
    /// stress mode).
    ///
    /// This sits at the top of the instruction dispatch, where every live
    /// object is reachable from the roots below: the operand stack, the
    /// call frames, the open upvalues, the globals (keys and values), the
    /// builtin type tables and the heap's own constants.
    pub(super) fn collect_garbage(&mut self) {
        if !self.heap.stress && !self.heap.needs_gc() {
            return;
        }

        self.heap.gc_start();

        #[cfg(feature = "log_gc")]
        eprintln!("Marking stack values.");
        for value in &self.stack {
            self.heap.mark_value(*value);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking callstack closures.");
        for frame in self.callstack.iter() {
            self.heap.mark_object(frame.function);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking open upvalues.");
        for upvalue in &self.open_upvalues {
            self.heap.mark_object(*upvalue);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking globals.");
        for (name, value) in &self.globals {
            self.heap.mark_object(*name);
            self.heap.mark_value(*value);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking builtin types.");
        for builtin in self.builtin_types.all() {
            self.heap.mark_object(builtin);
        }

        self.heap.trace();
        self.heap.sweep();
    }

    /// Report the call stack, innermost frame first, with the source
    /// line of the instruction each frame is sitting on.
    pub(super) fn print_stack_trace(&self) {
        for frame in self.callstack.iter().rev() {
            let code_key = self.heap[frame.function].data.as_function().code;
            let code = self.heap.function_code(code_key);
            let span = code.chunk.get_span(CodeOffset(frame.ip.saturating_sub(1)));
            eprintln!("[line {}] in {}", *span.line, self.heap.string(code.name));
        }
    }
}
