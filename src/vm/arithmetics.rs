//! Arithmetic, comparison and equality handlers.

use super::VM;
use crate::chunk::OpCode;
use crate::config::CONCAT_SCRATCH_MAX;
use crate::object::ObjData;
use crate::value::Value;
use crate::vm::error::RuntimeError;

impl VM {
    /// Handle the numeric binary operators.
    ///
    /// Ints stay ints; mixing an int with a float promotes to float.
    /// `Add` additionally concatenates when both operands are strings.
    pub(super) fn binary_arithmetic(&mut self, op: OpCode) -> Result<(), RuntimeError> {
        let rhs = self
            .stack
            .pop()
            .expect("Stack underflow in binary operator (rhs)");
        let lhs = self
            .stack
            .pop()
            .expect("Stack underflow in binary operator (lhs)");

        if op == OpCode::Add && self.is_string(lhs) && self.is_string(rhs) {
            return self.concatenate(lhs, rhs);
        }

        let result = if lhs.is_int() && rhs.is_int() {
            self.int_arithmetic(op, lhs.as_int(), rhs.as_int())?
        } else if Self::is_numeric(lhs) && Self::is_numeric(rhs) {
            Self::float_arithmetic(op, Self::as_f64(lhs), Self::as_f64(rhs))
        } else {
            return Err(if op == OpCode::Add {
                runtime_error!(
                    self,
                    Type,
                    "Operands to '+' must be two numbers or two strings, got `{}` and `{}`.",
                    lhs.to_string(&self.heap),
                    rhs.to_string(&self.heap)
                )
            } else {
                runtime_error!(
                    self,
                    Type,
                    "Operands to '{}' must be numbers, got `{}` and `{}`.",
                    Self::operator_symbol(op),
                    lhs.to_string(&self.heap),
                    rhs.to_string(&self.heap)
                )
            });
        };
        self.stack_push(result);
        Ok(())
    }

    fn int_arithmetic(&mut self, op: OpCode, lhs: i32, rhs: i32) -> Result<Value, RuntimeError> {
        Ok(match op {
            OpCode::Add => Value::int(lhs.wrapping_add(rhs)),
            OpCode::Sub => Value::int(lhs.wrapping_sub(rhs)),
            OpCode::Mul => Value::int(lhs.wrapping_mul(rhs)),
            OpCode::Div => {
                if rhs == 0 {
                    return Err(runtime_error!(self, Type, "Integer division by zero."));
                }
                Value::int(lhs.wrapping_div(rhs))
            }
            OpCode::LessThan => Value::bool(lhs < rhs),
            OpCode::GreaterThan => Value::bool(lhs > rhs),
            x => unreachable!("Not a binary arithmetic opcode: {x:?}"),
        })
    }

    fn float_arithmetic(op: OpCode, lhs: f64, rhs: f64) -> Value {
        match op {
            OpCode::Add => Value::float(lhs + rhs),
            OpCode::Sub => Value::float(lhs - rhs),
            OpCode::Mul => Value::float(lhs * rhs),
            OpCode::Div => Value::float(lhs / rhs),
            OpCode::LessThan => Value::bool(lhs < rhs),
            OpCode::GreaterThan => Value::bool(lhs > rhs),
            x => unreachable!("Not a binary arithmetic opcode: {x:?}"),
        }
    }

    /// Handle `Equal`: raw bit comparison. Interned strings satisfy
    /// byte equality through key equality; other objects compare by
    /// identity.
    pub(super) fn equal(&mut self) {
        let rhs = self.stack.pop().expect("Stack underflow in OP_EQUAL (rhs)");
        let lhs = self.stack.pop().expect("Stack underflow in OP_EQUAL (lhs)");
        self.stack_push(Value::bool(lhs == rhs));
    }

    /// Concatenate two strings through the reusable scratch buffer and
    /// intern the result.
    fn concatenate(&mut self, lhs: Value, rhs: Value) -> Result<(), RuntimeError> {
        let mut buffer = std::mem::take(&mut self.concat_buf);
        buffer.clear();
        buffer.push_str(self.heap.string(lhs.as_object()));
        buffer.push_str(self.heap.string(rhs.as_object()));
        let result = self.heap.copy_string(&buffer);
        if buffer.capacity() > CONCAT_SCRATCH_MAX {
            buffer = String::new();
        }
        self.concat_buf = buffer;
        self.stack_push(Value::object(result));
        Ok(())
    }

    fn is_string(&self, value: Value) -> bool {
        value.is_object() && matches!(self.heap[value.as_object()].data, ObjData::String(_))
    }

    const fn is_numeric(value: Value) -> bool {
        value.is_int() || value.is_float()
    }

    fn as_f64(value: Value) -> f64 {
        if value.is_int() {
            f64::from(value.as_int())
        } else {
            value.as_float()
        }
    }

    const fn operator_symbol(op: OpCode) -> &'static str {
        match op {
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::LessThan => "<",
            OpCode::GreaterThan => ">",
            _ => "?",
        }
    }
}
