//! Member lookup and binding: `GetMember`/`SetMember`, the fused
//! `Invoke`, superclass dispatch and the class-building opcodes.

use super::VM;
use crate::heap::ObjKey;
use crate::object::{Class, Method, ObjData};
use crate::value::Value;
use crate::vm::error::RuntimeError;

impl VM {
    /// Dict lookup with instance-to-class and class-to-parent chaining.
    ///
    /// An attribute on the object itself shadows anything further down
    /// the chain. The returned flag reports whether the hit came through
    /// a method table, which decides whether functions get bound.
    pub(super) fn get_member_obj(
        &self,
        obj: ObjKey,
        name: ObjKey,
        is_method: bool,
    ) -> Option<(Value, bool)> {
        if let Some(value) = self.heap[obj].dict.get(&name) {
            return Some((*value, is_method));
        }
        match &self.heap[obj].data {
            ObjData::Instance(instance) => self.get_member_obj(instance.class, name, true),
            ObjData::Class(class) => class
                .parent
                .and_then(|parent| self.get_member_obj(parent, name, is_method)),
            _ => None,
        }
    }

    /// Member lookup dispatching on the receiver's kind.
    ///
    /// Objects search their own dict and chains; primitive values search
    /// the method table of their builtin type. Strings get both: own dict
    /// misses fall through to the string builtin type.
    ///
    /// Own attributes are plain values even when they hold functions;
    /// only hits that travel through a class or builtin type table come
    /// back method-flagged.
    pub(super) fn get_member_value(&self, receiver: Value, name: ObjKey) -> Option<(Value, bool)> {
        if receiver.is_object() {
            let key = receiver.as_object();
            if let Some(hit) = self.get_member_obj(key, name, false) {
                return Some(hit);
            }
            if matches!(self.heap[key].data, ObjData::String(_)) {
                return self.get_member_obj(self.builtin_types.string, name, true);
            }
            None
        } else {
            self.get_member_obj(self.builtin_type_for(receiver), name, true)
        }
    }

    fn builtin_type_for(&self, value: Value) -> ObjKey {
        if value.is_int() {
            self.builtin_types.int
        } else if value.is_float() {
            self.builtin_types.float
        } else if value.is_bool() {
            self.builtin_types.bool
        } else {
            self.builtin_types.null
        }
    }

    fn is_function(&self, value: Value) -> bool {
        value.is_object() && matches!(self.heap[value.as_object()].data, ObjData::Function(_))
    }

    /// Handle `GetMember`: replace the receiver with the resolved value,
    /// binding functions found through a method table to the receiver.
    pub(super) fn get_member(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("GET_MEMBER");
        let receiver = *self.peek(0).expect("Stack underflow in GET_MEMBER");
        match self.get_member_value(receiver, name) {
            Some((value, is_method)) => {
                let resolved = if is_method && self.is_function(value) {
                    let method = self.heap.allocate(ObjData::Method(Method {
                        this_val: receiver,
                        func: value.as_object(),
                    }));
                    Value::object(method)
                } else {
                    value
                };
                let top = self.stack.len() - 1;
                self.stack[top] = resolved;
                Ok(())
            }
            None => Err(runtime_error!(
                self,
                Name,
                "Undefined member '{}' on `{}`.",
                self.heap.string(name),
                receiver.to_string(&self.heap)
            )),
        }
    }

    /// Handle `SetMember`. The compiler pushes the value first and the
    /// receiver on top; the value stays behind as the expression result.
    pub(super) fn set_member(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("SET_MEMBER");
        let receiver = self.stack.pop().expect("Stack underflow in SET_MEMBER");
        let value = *self.peek(0).expect("Stack underflow in SET_MEMBER");
        if !receiver.is_object() {
            return Err(runtime_error!(
                self,
                Type,
                "Cannot set member '{}' on `{}`.",
                self.heap.string(name),
                receiver.to_string(&self.heap)
            ));
        }
        let key = receiver.as_object();
        if self.heap[key].immutable() {
            return Err(runtime_error!(
                self,
                Type,
                "Cannot set member '{}' on immutable `{}`.",
                self.heap.string(name),
                receiver.to_string(&self.heap)
            ));
        }
        self.heap[key].dict.insert(name, value);
        Ok(())
    }

    /// Handle `Invoke`, the fused member-lookup plus call.
    ///
    /// A function resolved through a method table runs as a method with
    /// the receiver spliced in; anything else is called as a plain value
    /// with the receiver discarded.
    pub(super) fn invoke(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_INVOKE");
        let arg_count = self.read_byte();
        let receiver = *self
            .peek(arg_count.into())
            .expect("Stack underflow in OP_INVOKE");
        match self.get_member_value(receiver, name) {
            Some((value, is_method)) => {
                if is_method && self.is_function(value) {
                    self.call_method_like(usize::from(arg_count), value.as_object(), receiver, false)
                } else {
                    let callee_slot = self.stack.len() - usize::from(arg_count) - 1;
                    self.stack[callee_slot] = value;
                    self.call_value(value, arg_count)
                }
            }
            None => Err(runtime_error!(
                self,
                Name,
                "Undefined member '{}' on `{}`.",
                self.heap.string(name),
                receiver.to_string(&self.heap)
            )),
        }
    }

    /// Handle `GetSuper`. Stack: receiver below, superclass on top.
    pub(super) fn get_super(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_GET_SUPER");
        let superclass = self.stack.pop().expect("Stack underflow in OP_GET_SUPER");
        if !superclass.is_object()
            || !matches!(self.heap[superclass.as_object()].data, ObjData::Class(_))
        {
            return Err(runtime_error!(
                self,
                Type,
                "'super' must be a class, got `{}`.",
                superclass.to_string(&self.heap)
            ));
        }
        let this_val = *self.peek(0).expect("Stack underflow in OP_GET_SUPER");
        match self.get_member_obj(superclass.as_object(), name, true) {
            Some((value, _)) => {
                let resolved = if self.is_function(value) {
                    let method = self.heap.allocate(ObjData::Method(Method {
                        this_val,
                        func: value.as_object(),
                    }));
                    Value::object(method)
                } else {
                    value
                };
                let top = self.stack.len() - 1;
                self.stack[top] = resolved;
                Ok(())
            }
            None => Err(runtime_error!(
                self,
                Name,
                "Undefined method '{}' on `{}`.",
                self.heap.string(name),
                superclass.to_string(&self.heap)
            )),
        }
    }

    /// Handle `Class`: push a fresh class with no parent and no methods.
    pub(super) fn class_declaration(&mut self) {
        let name = self.read_string("OP_CLASS");
        let class = self.heap.allocate(ObjData::Class(Class { name, parent: None }));
        self.stack_push(Value::object(class));
    }

    /// Handle `Inherit`. Stack: superclass below, subclass on top; the
    /// subclass is consumed, the superclass stays as the `super` binding.
    pub(super) fn inherit(&mut self) -> Result<(), RuntimeError> {
        let subclass = self.stack.pop().expect("Stack underflow in OP_INHERIT");
        let superclass = *self.peek(0).expect("Stack underflow in OP_INHERIT");
        if !superclass.is_object()
            || !matches!(self.heap[superclass.as_object()].data, ObjData::Class(_))
        {
            return Err(runtime_error!(
                self,
                Type,
                "Superclass must be a class, got `{}`.",
                superclass.to_string(&self.heap)
            ));
        }
        self.heap[subclass.as_object()].data.as_class_mut().parent =
            Some(superclass.as_object());
        Ok(())
    }

    /// Handle `AttachMethod`. Stack: class below, method on top.
    pub(super) fn attach_method(&mut self) {
        let name = self.read_string("OP_ATTACH_METHOD");
        let method = *self.peek(0).expect("Stack underflow in OP_ATTACH_METHOD");
        let class = *self.peek(1).expect("Stack underflow in OP_ATTACH_METHOD");
        self.heap[class.as_object()].dict.insert(name, method);
        self.stack.pop();
    }
}
