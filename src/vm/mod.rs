//! The vm module contains the main struct for the virtual machine and
//! heart of the interpreter.
//!
//! The VM orchestrates scanning, parsing, compilation to bytecode and
//! the actual execution of the bytecode.

#[macro_use]
mod runtime_error;
#[macro_use]
mod run_instruction;
mod arithmetics;
mod bytecode;
mod calls;
mod callstack;
pub mod error;
mod garbage_collection;
mod members;
mod natives;
mod stack;
mod variables;
#[cfg(test)]
mod tests;

use std::collections::VecDeque;

use rustc_hash::FxHashMap as HashMap;

use crate::chunk::OpCode;
use crate::compiler;
use crate::heap::{Heap, ObjKey};
use crate::object::{BuiltinType, Function, ObjData};
use crate::parser::Parser;
use crate::scanner::Scanner;
use crate::value::Value;
use callstack::CallStack;

#[derive(Debug, PartialEq, Eq)]
pub enum InterpretResult {
    /// The program ran to completion; the payload is its numeric result
    /// (0 for `Halt`, the returned int for a top-level return).
    Ok(i32),
    CompileError,
    RuntimeError,
}

/// Where program output goes. Tests swap in a buffer so that scripts can
/// be asserted on byte for byte.
enum Output {
    Stdout,
    Buffer(Vec<u8>),
}

/// Method tables attached to the primitive value kinds.
///
/// Looking up a member on an int, float, bool, null or string receiver
/// searches the dict of the matching table.
#[derive(Clone, Copy)]
struct BuiltinTypes {
    int: ObjKey,
    float: ObjKey,
    bool: ObjKey,
    string: ObjKey,
    null: ObjKey,
}

impl BuiltinTypes {
    fn new(heap: &mut Heap) -> Self {
        let mut builtin = |name: &str| {
            let name = heap.copy_string(name);
            heap.allocate(ObjData::BuiltinType(BuiltinType { name }))
        };
        Self {
            int: builtin("int"),
            float: builtin("float"),
            bool: builtin("bool"),
            string: builtin("string"),
            null: builtin("null"),
        }
    }

    const fn all(self) -> [ObjKey; 5] {
        [self.int, self.float, self.bool, self.string, self.null]
    }
}

/// The main struct for the virtual machine and heart of the interpreter.
pub struct VM {
    pub(crate) heap: Heap,
    stack: Vec<Value>,
    callstack: CallStack,
    globals: HashMap<ObjKey, Value>,
    open_upvalues: VecDeque<ObjKey>,
    builtin_types: BuiltinTypes,
    output: Output,
    concat_buf: String,
}

impl VM {
    #[must_use]
    pub fn new(gc_stress: bool) -> Self {
        let mut heap = Heap::new(gc_stress);
        let builtin_types = BuiltinTypes::new(&mut heap);
        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(crate::config::STACK_MAX),
            callstack: CallStack::new(),
            globals: HashMap::default(),
            open_upvalues: VecDeque::new(),
            builtin_types,
            output: Output::Stdout,
            concat_buf: String::new(),
        };
        natives::define(&mut vm);
        vm
    }

    /// A VM whose program output is captured instead of printed.
    #[must_use]
    pub fn with_buffered_output(gc_stress: bool) -> Self {
        let mut vm = Self::new(gc_stress);
        vm.output = Output::Buffer(Vec::new());
        vm
    }

    /// Drain the captured output. Empty for stdout VMs.
    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Buffer(buffer) => String::from_utf8(std::mem::take(buffer)).unwrap(),
            Output::Stdout => String::new(),
        }
    }

    pub(crate) fn write_line(&mut self, text: &str) {
        match &mut self.output {
            Output::Stdout => println!("{text}"),
            Output::Buffer(buffer) => {
                buffer.extend_from_slice(text.as_bytes());
                buffer.push(b'\n');
            }
        }
    }

    /// Main interpret step for an input of bytes.
    ///
    /// Works by compiling the source to bytecode and then running it.
    /// Even the top level script is executed as a function.
    pub fn interpret(&mut self, source: &[u8]) -> InterpretResult {
        let Some(program) = Parser::new(Scanner::new(source)).parse() else {
            return InterpretResult::CompileError;
        };
        let Some(code) = compiler::compile(&program, &mut self.heap) else {
            return InterpretResult::CompileError;
        };

        let function = self.heap.allocate(ObjData::Function(Function {
            code,
            upvalues: Vec::new(),
        }));
        self.stack_push(Value::object(function));
        if self.execute_call(function, 0, false).is_err() {
            return InterpretResult::RuntimeError;
        }

        let result = self.run();

        // Anything still captured has to move off the stack before it is
        // torn down; the VM may be reused for another line.
        self.close_upvalues(0);
        self.stack.clear();
        self.callstack.clear();
        result
    }

    /// Free everything still on the heap, balancing the allocation
    /// statistics. Only statistics queries are meaningful afterwards.
    pub fn shutdown(&mut self) {
        self.globals.clear();
        self.heap.free_all();
    }

    /// All-time `(allocated, freed)` object counts.
    #[must_use]
    pub fn gc_statistics(&self) -> (usize, usize) {
        (self.heap.allocated_objects(), self.heap.freed_objects())
    }

    /// Infinite loop over the bytecode.
    ///
    /// Returns when `Halt` or a top-level return is hit.
    fn run(&mut self) -> InterpretResult {
        loop {
            run_instruction!(self);
        }
    }
}
