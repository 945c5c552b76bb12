//! This module handles functionality related to variables.
//!
//! Contains functions for resolving variables as local, upvalue or global.

use crate::chunk::OpCode;
use crate::types::Span;
use crate::value::Value;

use super::{Compiler, LocalVar, UpVar};

/// Whether a named variable reference reads or writes it.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(super) enum VariableAccess {
    Get,
    Set,
}

impl<'ast> Compiler<'ast, '_> {
    /// Start a new scope.
    pub(super) fn begin_scope(&mut self) {
        *self.state_mut().scope_depth += 1;
    }

    /// End the most recent scope.
    ///
    /// Every local that belonged to it is either popped directly from the
    /// stack or, if it is captured by a closure, closed into an upvalue.
    pub(super) fn end_scope(&mut self, span: Span) {
        *self.state_mut().scope_depth -= 1;
        let scope_depth = self.scope_depth();
        let mut instructions = vec![];
        {
            let locals = self.locals_mut();
            while locals.last().is_some_and(|local| local.depth > scope_depth) {
                instructions.push(if locals.last().unwrap().captured {
                    OpCode::CloseUpvalue
                } else {
                    OpCode::Pop
                });
                locals.pop();
            }
        }
        for instruction in instructions {
            self.emit(instruction, span);
        }
    }

    /// Resolve a named variable and emit the matching get or set opcode.
    ///
    /// Locals are searched innermost first, then the enclosing functions
    /// are walked for something to capture, and whatever is left must be
    /// a global.
    pub(super) fn named_variable(&mut self, name: &str, access: VariableAccess, span: Span) {
        let (get_op, set_op, arg) = if let Some(local) = self.resolve_local(name, span) {
            (OpCode::GetLocal, OpCode::SetLocal, local)
        } else if let Some(upvalue) = self.resolve_upvalue(name, span) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, upvalue)
        } else {
            let name_value = Value::object(self.heap.copy_string(name));
            let index = self.literal_index(name_value, span);
            (OpCode::GetGlobal, OpCode::SetGlobal, index)
        };

        let op = match access {
            VariableAccess::Get => get_op,
            VariableAccess::Set => set_op,
        };
        self.emit(op, span);
        self.emit_u16(arg, span);
    }

    /// Resolve a local variable by its name.
    ///
    /// Iterates from the top of the locals backwards until one with that
    /// name is found. A hit whose depth is still -1 is being read inside
    /// its own initializer, which is not allowed.
    fn resolve_local(&mut self, name: &str, span: Span) -> Option<u16> {
        let found = self
            .locals()
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)
            .map(|(index, local)| (index, local.depth));
        match found {
            Some((_, -1)) => {
                self.error("Can't read local variable in its own initializer.", span);
                Some(0)
            }
            Some((index, _)) => Some(u16::try_from(index).unwrap()),
            None => None,
        }
    }

    /// Try to find an enclosing local or upvalue with the given name.
    ///
    /// Walks up the chain of enclosing functions. A direct hit on a local
    /// marks it captured and records a local upvalue here; a hit that an
    /// enclosing function itself resolved as an upvalue is re-recorded as
    /// a non-local one.
    fn resolve_upvalue(&mut self, name: &str, span: Span) -> Option<u16> {
        if !self.has_enclosing() {
            return None;
        }

        if let Some(local) = self.in_enclosing(|compiler| compiler.resolve_local(name, span)) {
            self.in_enclosing(|compiler| {
                compiler.locals_mut()[usize::from(local)].captured = true;
            });
            return Some(self.add_upvalue(local, true, span));
        }

        if let Some(upvalue) = self.in_enclosing(|compiler| compiler.resolve_upvalue(name, span)) {
            return Some(self.add_upvalue(upvalue, false, span));
        }

        None
    }

    /// Record an upvalue, or reuse it if the same one is already tracked.
    fn add_upvalue(&mut self, index: u16, is_local: bool, span: Span) -> u16 {
        let existing = self
            .state()
            .upvalues
            .iter()
            .position(|upvalue| upvalue.index == index && upvalue.is_local == is_local);
        if let Some(existing) = existing {
            return u16::try_from(existing).unwrap();
        }

        if self.state().upvalues.len() == usize::from(u16::MAX) {
            self.error("Too many closure variables in function.", span);
            return 0;
        }

        let state = self.state_mut();
        state.upvalues.push(UpVar { index, is_local });
        state.code.upvalue_count = state.upvalues.len();
        u16::try_from(state.upvalues.len() - 1).unwrap()
    }

    /// Declare a variable in the current scope.
    ///
    /// At global scope no action is taken; globals are defined by name at
    /// runtime. Otherwise the name is checked against redeclaration in
    /// the same scope and added to the locals, still uninitialized.
    pub(super) fn declare_variable(&mut self, name: &'ast str, span: Span) {
        if self.scope_depth() == 0 {
            return;
        }

        let scope_depth = self.scope_depth();
        if self
            .locals()
            .iter()
            .rev()
            .take_while(|local| local.depth == -1 || local.depth >= scope_depth)
            .any(|local| local.name == name)
        {
            self.error("Already a variable with this name in this scope.", span);
        }

        self.add_local(name, span);
    }

    pub(super) fn add_local(&mut self, name: &'ast str, span: Span) {
        if self.locals().len() > usize::from(u16::MAX) {
            self.error("Too many local variables in function.", span);
            return;
        }
        self.locals_mut().push(LocalVar {
            name,
            depth: -1,
            captured: false,
        });
    }

    /// Emit bytecode for defining a variable.
    ///
    /// A local just gets marked as initialized; its value is already in
    /// its slot. A global is defined by name.
    pub(super) fn define_variable(&mut self, name: &str, span: Span) {
        if self.scope_depth() > 0 {
            self.mark_initialized();
            return;
        }
        let name_value = Value::object(self.heap.copy_string(name));
        self.emit_with_literal(OpCode::DefineGlobal, name_value, span);
    }

    /// Mark the most recent local as initialized by giving it its real
    /// scope depth.
    pub(super) fn mark_initialized(&mut self) {
        let scope_depth = self.scope_depth();
        if scope_depth == 0 {
            return;
        }
        if let Some(local) = self.locals_mut().last_mut() {
            local.depth = scope_depth;
        }
    }
}
