//! Global and upvalue opcode handlers, and closure creation.

use super::VM;
use crate::object::{Function, ObjData, UpValue};
use crate::value::Value;
use crate::vm::error::RuntimeError;

impl VM {
    /// `GetGlobal` requires the variable to exist.
    pub(super) fn get_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("GET_GLOBAL");
        match self.globals.get(&name) {
            Some(value) => {
                let value = *value;
                self.stack_push(value);
                Ok(())
            }
            None => Err(runtime_error!(
                self,
                Name,
                "Undefined variable '{}'.",
                self.heap.string(name)
            )),
        }
    }

    /// `SetGlobal` requires the variable to exist and leaves the value on
    /// the stack; the surrounding expression context pops it.
    pub(super) fn set_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("SET_GLOBAL");
        let value = *self
            .stack
            .last()
            .expect("Stack underflow in OP_SET_GLOBAL");
        match self.globals.get_mut(&name) {
            Some(global) => {
                *global = value;
                Ok(())
            }
            None => Err(runtime_error!(
                self,
                Name,
                "Undefined variable '{}'.",
                self.heap.string(name)
            )),
        }
    }

    /// `DefineGlobal` creates (or rebinds) the variable and consumes the
    /// value.
    pub(super) fn define_global(&mut self) {
        let name = self.read_string("DEFINE_GLOBAL");
        let value = *self
            .stack
            .last()
            .expect("Stack underflow in OP_DEFINE_GLOBAL");
        self.globals.insert(name, value);
        self.stack.pop();
    }

    /// `GetUpvalue`: push the value behind the current closure's upvalue,
    /// reading through to the stack while it is still open.
    pub(super) fn get_upvalue(&mut self) {
        let index = self.read_u16();
        let upvalue = self.heap[self.callstack.function()].data.as_function().upvalues[index];
        let value = match self.heap[upvalue].data.as_upvalue() {
            UpValue::Open(slot) => self.stack[*slot],
            UpValue::Closed(value) => *value,
        };
        self.stack_push(value);
    }

    /// `SetUpvalue`: write the top of stack (without popping) through the
    /// upvalue.
    pub(super) fn set_upvalue(&mut self) {
        let index = self.read_u16();
        let new_value = *self
            .stack
            .last()
            .expect("Stack underflow in OP_SET_UPVALUE");
        let upvalue = self.heap[self.callstack.function()].data.as_function().upvalues[index];
        let open_slot = match self.heap[upvalue].data.as_upvalue() {
            UpValue::Open(slot) => Some(*slot),
            UpValue::Closed(_) => None,
        };
        match open_slot {
            Some(slot) => self.stack[slot] = new_value,
            None => *self.heap[upvalue].data.as_upvalue_mut() = UpValue::Closed(new_value),
        }
    }

    /// `CloseFunction`: wrap the function code literal into a closure,
    /// capturing upvalues according to the trailing `(is_local, index)`
    /// pairs in the bytecode.
    pub(super) fn close_function(&mut self) {
        let literal = self.read_literal();
        let code = literal.as_object();
        let upvalue_count = self.heap.function_code(code).upvalue_count;

        let mut upvalues = Vec::with_capacity(upvalue_count);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte();
            debug_assert!(
                is_local == 0 || is_local == 1,
                "'is_local' must be 0 or 1, got {is_local}"
            );
            let index = self.read_u16();
            if is_local == 1 {
                upvalues.push(self.capture_upvalue(index));
            } else {
                upvalues
                    .push(self.heap[self.callstack.function()].data.as_function().upvalues[index]);
            }
        }

        let function = self
            .heap
            .allocate(ObjData::Function(Function { code, upvalues }));
        self.stack_push(Value::object(function));
    }
}
