//! Statement lowering, including function and class declarations.

use crate::ast::{FunctionDecl, Stmt};
use crate::chunk::{CodeOffset, OpCode};
use crate::object::ObjData;
use crate::types::Span;
use crate::value::Value;

use super::variables::VariableAccess;
use super::{Compiler, FunctionKind};

impl<'ast> Compiler<'ast, '_> {
    pub(super) fn compile_stmt(&mut self, statement: &'ast Stmt) {
        match statement {
            Stmt::Expression { expr } => {
                self.compile_expr(expr);
                self.emit(OpCode::Pop, expr.span);
            }
            Stmt::VarDecl {
                name,
                initializer,
                span,
            } => self.var_declaration(name, initializer.as_ref(), *span),
            Stmt::Function(decl) => self.function_declaration(decl),
            Stmt::Class {
                name,
                superclass,
                methods,
                span,
            } => self.class_declaration(name, superclass.as_ref(), methods, *span),
            Stmt::Block { statements, span } => {
                self.begin_scope();
                for statement in statements {
                    self.compile_stmt(statement);
                }
                self.end_scope(*span);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => {
                self.compile_expr(condition);
                let then_jump = self.emit_jump(OpCode::JumpIfFalse, *span);
                self.emit(OpCode::Pop, *span);
                self.compile_stmt(then_branch);
                let else_jump = self.emit_jump(OpCode::Jump, *span);
                self.patch_jump(then_jump, *span);
                self.emit(OpCode::Pop, *span);
                if let Some(else_branch) = else_branch {
                    self.compile_stmt(else_branch);
                }
                self.patch_jump(else_jump, *span);
            }
            Stmt::While {
                condition,
                body,
                span,
            } => {
                let loop_start = CodeOffset(self.current_chunk_len());
                self.compile_expr(condition);
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse, *span);
                self.emit(OpCode::Pop, *span);
                self.compile_stmt(body);
                self.emit_loop(loop_start, *span);
                self.patch_jump(exit_jump, *span);
                self.emit(OpCode::Pop, *span);
            }
            Stmt::For {
                initializer,
                condition,
                step,
                body,
                span,
            } => {
                self.begin_scope();
                if let Some(initializer) = initializer {
                    self.compile_stmt(initializer);
                }
                let loop_start = CodeOffset(self.current_chunk_len());
                match condition {
                    Some(condition) => self.compile_expr(condition),
                    None => self.emit(OpCode::True, *span),
                }
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse, *span);
                self.emit(OpCode::Pop, *span);
                self.compile_stmt(body);
                if let Some(step) = step {
                    self.compile_expr(step);
                    self.emit(OpCode::Pop, *span);
                }
                self.emit_loop(loop_start, *span);
                self.patch_jump(exit_jump, *span);
                self.emit(OpCode::Pop, *span);
                self.end_scope(*span);
            }
            Stmt::Return { value, span } => {
                match value {
                    Some(value) => self.compile_expr(value),
                    None => self.emit(OpCode::Null, *span),
                }
                self.emit(OpCode::Return, *span);
            }
        }
    }

    fn var_declaration(&mut self, name: &'ast str, initializer: Option<&'ast crate::ast::Expr>, span: Span) {
        self.declare_variable(name, span);
        match initializer {
            Some(initializer) => self.compile_expr(initializer),
            None => self.emit(OpCode::Null, span),
        }
        self.define_variable(name, span);
    }

    /// Function declarations bind the name before the body is compiled so
    /// that the function can reference itself.
    fn function_declaration(&mut self, decl: &'ast FunctionDecl) {
        self.declare_variable(&decl.name, decl.span);
        self.mark_initialized();
        self.function_value(decl);
        self.define_variable(&decl.name, decl.span);
    }

    /// Compile a function literal, decorators included, leaving the final
    /// (possibly decorated) function value on the stack.
    ///
    /// Decorator expressions are evaluated first, in source order, then
    /// the function itself, and finally each decorator is applied as a
    /// one-argument call. The stack order makes the applications run
    /// bottom up, innermost decorator first.
    pub(super) fn function_value(&mut self, decl: &'ast FunctionDecl) {
        for decorator in &decl.decorators {
            self.compile_expr(decorator);
        }

        self.start_nesting(&decl.name, FunctionKind::Function);
        self.state_mut().code.arity = u8::try_from(decl.params.len()).unwrap();
        self.begin_scope();
        for (param, param_span) in &decl.params {
            self.declare_variable(param, *param_span);
            self.mark_initialized();
        }
        for statement in &decl.body {
            self.compile_stmt(statement);
        }
        // Safety net for bodies that do not end in an explicit return.
        self.emit_end(decl.span);

        let state = self.end_nesting();
        let code_key = self.heap.allocate(ObjData::FunctionCode(state.code));
        self.emit_with_literal(OpCode::CloseFunction, Value::object(code_key), decl.span);
        for upvalue in &state.upvalues {
            self.emit(u8::from(upvalue.is_local), decl.span);
            self.emit_u16(upvalue.index, decl.span);
        }

        for _ in &decl.decorators {
            self.emit(OpCode::Call, decl.span);
            self.emit(1u8, decl.span);
        }
    }

    fn class_declaration(
        &mut self,
        name: &'ast str,
        superclass: Option<&'ast (String, Span)>,
        methods: &'ast [FunctionDecl],
        span: Span,
    ) {
        self.declare_variable(name, span);
        let name_value = Value::object(self.heap.copy_string(name));
        self.emit_with_literal(OpCode::Class, name_value, span);
        self.define_variable(name, span);

        let has_superclass = superclass.is_some();
        if let Some((super_name, super_span)) = superclass {
            if super_name == name {
                self.error("A class can't inherit from itself.", *super_span);
            }
            self.begin_scope();
            self.named_variable(super_name, VariableAccess::Get, *super_span);
            self.add_local("super", *super_span);
            self.mark_initialized();
            self.named_variable(name, VariableAccess::Get, *super_span);
            self.emit(OpCode::Inherit, *super_span);
        }

        self.named_variable(name, VariableAccess::Get, span);
        for method in methods {
            self.function_value(method);
            let method_name = Value::object(self.heap.copy_string(&method.name));
            self.emit_with_literal(OpCode::AttachMethod, method_name, method.span);
        }
        self.emit(OpCode::Pop, span);

        if has_superclass {
            self.end_scope(span);
        }
    }
}
