//! Call dispatch: closures, natives, class instantiation, bound methods,
//! upvalue capture and the return protocol.

use super::{InterpretResult, VM};
use crate::heap::ObjKey;
use crate::object::{Instance, ObjData, UpValue};
use crate::value::Value;
use crate::vm::error::RuntimeError;

/// What to do with a callee, decided before any state is touched.
enum CallAction {
    Function,
    Native,
    Class,
    Method(Value, ObjKey),
    NotCallable,
}

impl VM {
    /// Handle the `Call` opcode. The operand is the argument count; the
    /// callee sits below the arguments on the stack.
    pub(super) fn call(&mut self) -> Result<(), RuntimeError> {
        let arg_count = self.read_byte();
        let callee = self.stack[self.stack.len() - 1 - usize::from(arg_count)];
        self.call_value(callee, arg_count)
    }

    /// Call the passed value with the passed number of arguments.
    ///
    /// Callable values are closures, native functions, classes (which
    /// instantiate and run `init` when present) and bound methods.
    pub(super) fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        let action = if callee.is_object() {
            match &self.heap[callee.as_object()].data {
                ObjData::Function(_) => CallAction::Function,
                ObjData::NativeFunction(_) => CallAction::Native,
                ObjData::Class(_) => CallAction::Class,
                ObjData::Method(method) => CallAction::Method(method.this_val, method.func),
                _ => CallAction::NotCallable,
            }
        } else {
            CallAction::NotCallable
        };

        match action {
            CallAction::Function => {
                self.execute_call(callee.as_object(), usize::from(arg_count), false)
            }
            CallAction::Native => self.execute_native_call(callee.as_object(), arg_count),
            CallAction::Class => self.instantiate_class(callee.as_object(), arg_count),
            CallAction::Method(this_val, func) => {
                self.call_method_like(usize::from(arg_count), func, this_val, false)
            }
            CallAction::NotCallable => Err(runtime_error!(
                self,
                Type,
                "Can only call functions and classes, got `{}`.",
                callee.to_string(&self.heap)
            )),
        }
    }

    /// Execute a closure call.
    ///
    /// The arity of the function is checked against the provided number
    /// of arguments, then a frame is pushed whose slot 0 is the callee.
    pub(super) fn execute_call(
        &mut self,
        function: ObjKey,
        arg_count: usize,
        is_constructor: bool,
    ) -> Result<(), RuntimeError> {
        let code_key = self.heap[function].data.as_function().code;
        let arity = usize::from(self.heap.function_code(code_key).arity);
        if arity != arg_count {
            return Err(runtime_error!(
                self,
                Arity,
                "Expected {} argument{} but got {}.",
                arity,
                if arity == 1 { "" } else { "s" },
                arg_count
            ));
        }

        if self.callstack.len() == crate::config::FRAMES_MAX {
            return Err(runtime_error!(self, Type, "Stack overflow."));
        }

        self.callstack.push(
            function,
            self.stack.len() - arg_count - 1,
            is_constructor,
            &self.heap,
        );
        Ok(())
    }

    /// Splice the receiver into the stack before the arguments and
    /// dispatch the function as if it were called with one extra
    /// argument. Slot 1 of the new frame is therefore the receiver.
    pub(super) fn call_method_like(
        &mut self,
        arg_count: usize,
        func: ObjKey,
        this_val: Value,
        is_constructor: bool,
    ) -> Result<(), RuntimeError> {
        let insert_at = self.stack.len() - arg_count;
        self.stack.insert(insert_at, this_val);
        self.execute_call(func, arg_count + 1, is_constructor)
    }

    /// Calling a class allocates an instance and runs its initializer,
    /// if it has one, as a constructor frame.
    fn instantiate_class(&mut self, class: ObjKey, arg_count: u8) -> Result<(), RuntimeError> {
        let instance = self.heap.allocate(ObjData::Instance(Instance { class }));
        let instance_val = Value::object(instance);
        let callee_slot = self.stack.len() - usize::from(arg_count) - 1;
        self.stack[callee_slot] = instance_val;

        let init_string = self.heap.builtin_constants().init_string;
        match self.get_member_obj(class, init_string, true) {
            Some((initializer, _)) => {
                if initializer.is_object()
                    && matches!(
                        self.heap[initializer.as_object()].data,
                        ObjData::Function(_)
                    )
                {
                    self.call_method_like(
                        usize::from(arg_count),
                        initializer.as_object(),
                        instance_val,
                        true,
                    )
                } else {
                    Err(runtime_error!(
                        self,
                        Type,
                        "'init' of class {} must be a function, got `{}`.",
                        self.heap[class].to_string(&self.heap),
                        initializer.to_string(&self.heap)
                    ))
                }
            }
            None if arg_count != 0 => Err(runtime_error!(
                self,
                Arity,
                "Expected 0 arguments but got {arg_count}."
            )),
            None => Ok(()),
        }
    }

    /// Execute a call to a native function.
    ///
    /// After the call the arguments and the callee are replaced by the
    /// returned value.
    fn execute_native_call(&mut self, native: ObjKey, arg_count: u8) -> Result<(), RuntimeError> {
        let (name, arity, fun) = {
            let native = match &self.heap[native].data {
                ObjData::NativeFunction(native) => native,
                x => unreachable!("Expected NativeFunction, found `{x:?}`"),
            };
            (native.name, native.arity, native.fun)
        };
        if let Some(arity) = arity {
            if arity != arg_count {
                return Err(runtime_error!(
                    self,
                    Arity,
                    "Native function '{}' expected {} argument{}, got {}.",
                    self.heap.string(name),
                    arity,
                    if arity == 1 { "" } else { "s" },
                    arg_count
                ));
            }
        }

        let start = self.stack.len() - usize::from(arg_count);
        let args: Vec<Value> = self.stack[start..].to_vec();
        match fun(self, &args) {
            Ok(value) => {
                self.stack.truncate(start - 1);
                self.stack_push(value);
                Ok(())
            }
            Err(message) => Err(runtime_error!(self, Type, "{message}")),
        }
    }
}

// Upvalues.
impl VM {
    /// Capture the stack slot `local` (relative to the current frame) as
    /// an upvalue, sharing an already open one if it exists.
    ///
    /// The open list is kept ordered by descending slot.
    pub(super) fn capture_upvalue(&mut self, local: usize) -> ObjKey {
        let local = self.callstack.current().stack_base + local;

        let mut insert_at = self.open_upvalues.len();
        for (index, &key) in self.open_upvalues.iter().enumerate() {
            let slot = self.heap[key].data.as_upvalue().as_open();
            if slot <= local {
                if slot == local {
                    return key;
                }
                insert_at = index;
                break;
            }
        }

        let upvalue = self.heap.allocate(ObjData::UpValue(UpValue::Open(local)));
        self.open_upvalues.insert(insert_at, upvalue);
        upvalue
    }

    /// Close every open upvalue pointing at `last` or above, relocating
    /// the stack value into the upvalue object.
    pub(super) fn close_upvalues(&mut self, last: usize) {
        while let Some(&front) = self.open_upvalues.front() {
            let slot = self.heap[front].data.as_upvalue().as_open();
            if slot < last {
                break;
            }
            self.open_upvalues.pop_front();
            let value = self.stack[slot];
            *self.heap[front].data.as_upvalue_mut() = UpValue::Closed(value);
        }
    }
}

// Return.
impl VM {
    /// Return from the current frame.
    ///
    /// A return from the outermost frame ends the program; its value is
    /// the process result and must be an int. A constructor frame ignores
    /// the returned value and produces the receiver instead.
    pub(super) fn return_(&mut self) -> Result<Option<InterpretResult>, RuntimeError> {
        if self.callstack.len() == 1 {
            let result = self.stack.pop().expect("Stack underflow in OP_RETURN");
            if result.is_int() {
                self.callstack.pop(&self.heap);
                return Ok(Some(InterpretResult::Ok(result.as_int())));
            }
            return Err(runtime_error!(
                self,
                TopLevelReturn,
                "Top-level return value must be an int, got `{}`.",
                result.to_string(&self.heap)
            ));
        }

        let result = self.stack.pop().expect("Stack underflow in OP_RETURN");
        let frame = self
            .callstack
            .pop(&self.heap)
            .expect("Call stack underflow in OP_RETURN");
        let result = if frame.is_constructor {
            self.stack[frame.stack_base + 1]
        } else {
            result
        };
        self.close_upvalues(frame.stack_base);
        self.stack.truncate(frame.stack_base);
        self.stack_push(result);
        Ok(None)
    }
}
