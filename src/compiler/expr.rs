//! Expression lowering.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::chunk::OpCode;
use crate::value::Value;

use super::variables::VariableAccess;
use super::Compiler;

impl<'ast> Compiler<'ast, '_> {
    pub(super) fn compile_expr(&mut self, expr: &'ast Expr) {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(value) => self.emit_constant(Value::int(*value), span),
            ExprKind::Float(value) => self.emit_constant(Value::float(*value), span),
            ExprKind::Str(value) => {
                let string = Value::object(self.heap.copy_string(value));
                self.emit_constant(string, span);
            }
            ExprKind::Bool(true) => self.emit(OpCode::True, span),
            ExprKind::Bool(false) => self.emit(OpCode::False, span),
            ExprKind::Null => self.emit(OpCode::Null, span),
            ExprKind::Identifier(name) => {
                self.named_variable(name, VariableAccess::Get, span);
            }
            ExprKind::Super { name } => {
                // The receiver and then the superclass, which lives in the
                // lexical `super` binding opened around the class body.
                self.named_variable("this", VariableAccess::Get, span);
                self.named_variable("super", VariableAccess::Get, span);
                let name_value = Value::object(self.heap.copy_string(name));
                self.emit_with_literal(OpCode::GetSuper, name_value, span);
            }
            ExprKind::Member { receiver, name } => {
                self.compile_expr(receiver);
                let name_value = Value::object(self.heap.copy_string(name));
                self.emit_with_literal(OpCode::GetMember, name_value, span);
            }
            ExprKind::Call { callee, args } => self.compile_call(callee, args, span),
            ExprKind::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs, span),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Neg => {
                    // There is no dedicated negation; `-x` is `0 - x`.
                    self.emit_constant(Value::int(0), span);
                    self.compile_expr(operand);
                    self.emit(OpCode::Sub, span);
                }
                UnaryOp::Not => self.error("The '!' operator is not supported.", span),
            },
        }
    }

    /// Calls on a member expression fuse lookup and call into `Invoke`,
    /// which preserves the receiver for method dispatch. Everything else
    /// is a plain `Call`.
    fn compile_call(&mut self, callee: &'ast Expr, args: &'ast [Expr], span: crate::types::Span) {
        if let ExprKind::Member { receiver, name } = &callee.kind {
            self.compile_expr(receiver);
            for arg in args {
                self.compile_expr(arg);
            }
            let name_value = Value::object(self.heap.copy_string(name));
            self.emit(OpCode::Invoke, span);
            let index = self.literal_index(name_value, span);
            self.emit_u16(index, span);
            self.emit(u8::try_from(args.len()).unwrap(), span);
        } else {
            self.compile_expr(callee);
            for arg in args {
                self.compile_expr(arg);
            }
            self.emit(OpCode::Call, span);
            self.emit(u8::try_from(args.len()).unwrap(), span);
        }
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        lhs: &'ast Expr,
        rhs: &'ast Expr,
        span: crate::types::Span,
    ) {
        match op {
            BinaryOp::Assign => self.compile_assignment(lhs, rhs, span),
            BinaryOp::And => {
                self.compile_expr(lhs);
                let end_jump = self.emit_jump(OpCode::JumpIfFalse, span);
                self.emit(OpCode::Pop, span);
                self.compile_expr(rhs);
                self.patch_jump(end_jump, span);
            }
            BinaryOp::Or => {
                self.compile_expr(lhs);
                let else_jump = self.emit_jump(OpCode::JumpIfFalse, span);
                let end_jump = self.emit_jump(OpCode::Jump, span);
                self.patch_jump(else_jump, span);
                self.emit(OpCode::Pop, span);
                self.compile_expr(rhs);
                self.patch_jump(end_jump, span);
            }
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Equal
            | BinaryOp::LessThan
            | BinaryOp::GreaterThan => {
                self.compile_expr(lhs);
                self.compile_expr(rhs);
                let opcode = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Equal => OpCode::Equal,
                    BinaryOp::LessThan => OpCode::LessThan,
                    BinaryOp::GreaterThan => OpCode::GreaterThan,
                    _ => unreachable!(),
                };
                self.emit(opcode, span);
            }
            BinaryOp::NotEqual | BinaryOp::LessEqual | BinaryOp::GreaterEqual => {
                self.error(
                    &format!("The '{}' operator is not supported.", op.lexeme()),
                    span,
                );
            }
        }
    }

    /// The right hand side is compiled first; afterwards the target
    /// decides which set instruction consumes it.
    fn compile_assignment(&mut self, target: &'ast Expr, rhs: &'ast Expr, span: crate::types::Span) {
        self.compile_expr(rhs);
        match &target.kind {
            ExprKind::Identifier(name) => {
                self.named_variable(name, VariableAccess::Set, span);
            }
            ExprKind::Member { receiver, name } => {
                self.compile_expr(receiver);
                let name_value = Value::object(self.heap.copy_string(name));
                self.emit_with_literal(OpCode::SetMember, name_value, span);
            }
            _ => self.error("Invalid assignment target.", span),
        }
    }
}
