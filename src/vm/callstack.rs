use crate::heap::{Heap, ObjKey};

/// A call frame for the call stack.
///
/// Contains the closure being executed, the instruction pointer within its
/// chunk, and the `stack_base` at which the frame's slots begin (slot 0 is
/// the callee, slots 1.. are the arguments).
///
/// `is_constructor` makes `Return` substitute the receiver for whatever
/// the initializer tried to return.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    pub function: ObjKey,
    pub ip: usize,
    pub stack_base: usize,
    pub is_constructor: bool,
}

/// Actual call stack of the VM.
///
/// Keeps the current closure and its function code cached so the hot
/// bytecode-reading path does not have to chase them through the frames
/// vector every time.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    current_function: Option<ObjKey>,
    current_code: Option<ObjKey>,
}

impl CallStack {
    #[must_use]
    pub(super) fn new() -> Self {
        Self {
            frames: Vec::with_capacity(crate::config::FRAMES_MAX),
            current_function: None,
            current_code: None,
        }
    }

    pub(super) fn iter(&self) -> std::slice::Iter<'_, CallFrame> {
        self.frames.iter()
    }

    pub(super) fn len(&self) -> usize {
        self.frames.len()
    }

    fn set_currents(&mut self, heap: &Heap) {
        self.current_function = self.frames.last().map(|frame| frame.function);
        self.current_code = self
            .current_function
            .map(|function| heap[function].data.as_function().code);
    }

    pub(super) fn push(
        &mut self,
        function: ObjKey,
        stack_base: usize,
        is_constructor: bool,
        heap: &Heap,
    ) {
        self.frames.push(CallFrame {
            function,
            ip: 0,
            stack_base,
            is_constructor,
        });
        self.set_currents(heap);
    }

    pub(super) fn pop(&mut self, heap: &Heap) -> Option<CallFrame> {
        let frame = self.frames.pop();
        self.set_currents(heap);
        frame
    }

    pub(super) fn clear(&mut self) {
        self.frames.clear();
        self.current_function = None;
        self.current_code = None;
    }

    pub(super) fn current(&self) -> &CallFrame {
        let i = self.frames.len() - 1;
        &self.frames[i]
    }

    pub(super) fn current_mut(&mut self) -> &mut CallFrame {
        let i = self.frames.len() - 1;
        &mut self.frames[i]
    }

    pub(super) fn code_byte(&self, index: usize, heap: &Heap) -> u8 {
        heap.function_code(self.code()).chunk.code()[index]
    }

    /// The closure currently running.
    pub(super) fn function(&self) -> ObjKey {
        self.current_function.unwrap()
    }

    /// The function code of the closure currently running.
    pub(super) fn code(&self) -> ObjKey {
        self.current_code.unwrap()
    }
}
