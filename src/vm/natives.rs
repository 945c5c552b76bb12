//! Native functions callable from tide code.

#![allow(clippy::unnecessary_wraps)]

use std::time::{SystemTime, UNIX_EPOCH};

use super::VM;
use crate::object::{NativeFunction, NativeFunctionImpl, ObjData};
use crate::value::Value;

/// Register all native functions as globals.
pub(super) fn define(vm: &mut VM) {
    vm.define_native("clock", Some(0), clock_native);
    vm.define_native("print", None, print_native);
    vm.define_native("abs", Some(1), abs_native);
}

impl VM {
    fn define_native(&mut self, name: &str, arity: Option<u8>, fun: NativeFunctionImpl) {
        let name = self.heap.copy_string(name);
        let native = self
            .heap
            .allocate(ObjData::NativeFunction(NativeFunction { name, arity, fun }));
        self.globals.insert(name, Value::object(native));
    }
}

/// Seconds since the epoch as a float.
fn clock_native(_vm: &mut VM, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::float(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64(),
    ))
}

/// Print all arguments space separated, followed by a newline.
fn print_native(vm: &mut VM, args: &[Value]) -> Result<Value, String> {
    let rendered = args
        .iter()
        .map(|value| value.to_string(&vm.heap))
        .collect::<Vec<_>>()
        .join(" ");
    vm.write_line(&rendered);
    Ok(Value::NULL)
}

fn abs_native(vm: &mut VM, args: &[Value]) -> Result<Value, String> {
    if args[0].is_int() {
        Ok(Value::int(args[0].as_int().wrapping_abs()))
    } else {
        Err(format!(
            "'abs' expected an integer argument, got `{}`.",
            args[0].to_string(&vm.heap)
        ))
    }
}
