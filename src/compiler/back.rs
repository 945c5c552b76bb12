//! Backend of the compiler. This module is responsible for emitting bytecode.

use crate::chunk::{CodeOffset, OpCode};
use crate::types::Span;
use crate::value::Value;

use super::{Compiler, FunctionKind};

impl Compiler<'_, '_> {
    pub(super) fn emit<T>(&mut self, what: T, span: Span)
    where
        T: Into<u8>,
    {
        self.current_chunk().write(what, span);
    }

    pub(super) fn emit_u16(&mut self, what: u16, span: Span) {
        self.current_chunk().write_u16(what, span);
    }

    /// Emit an opcode whose operand is a literal pool index, interning the
    /// value into the pool.
    pub(super) fn emit_with_literal(&mut self, op: OpCode, value: Value, span: Span) {
        self.emit(op, span);
        let index = self.literal_index(value, span);
        self.emit_u16(index, span);
    }

    /// Put a value into the literal pool and return its 16 bit index.
    pub(super) fn literal_index(&mut self, value: Value, span: Span) -> u16 {
        match self.current_chunk().add_literal(value) {
            Some(index) => *index,
            None => {
                self.error("Too many literals in one chunk.", span);
                0
            }
        }
    }

    pub(super) fn emit_constant(&mut self, value: Value, span: Span) {
        self.emit_with_literal(OpCode::Constant, value, span);
    }

    /// Terminate the function being compiled. The script halts the VM;
    /// ordinary functions fall back to returning `null`.
    pub(super) fn emit_end(&mut self, span: Span) {
        match self.function_kind() {
            FunctionKind::Script => self.emit(OpCode::Halt, span),
            FunctionKind::Function => {
                self.emit(OpCode::Null, span);
                self.emit(OpCode::Return, span);
            }
        }
    }

    /// Emit a forward jump with a placeholder offset and return the
    /// position of the opcode for later patching.
    pub(super) fn emit_jump(&mut self, instruction: OpCode, span: Span) -> CodeOffset {
        self.emit(instruction, span);
        let retval = CodeOffset(self.current_chunk_len() - 1);
        self.emit_u16(0xffff, span);
        retval
    }

    /// Patch a forward jump to land just past the current end of code.
    pub(super) fn patch_jump(&mut self, jump_offset: CodeOffset, span: Span) {
        // 3: length of the jump instruction plus its operand.
        let jump_length = self.current_chunk_len() - *jump_offset - 3;
        match u16::try_from(jump_length) {
            Ok(jump_length) => {
                self.current_chunk()
                    .patch_u16(CodeOffset(*jump_offset + 1), jump_length);
            }
            Err(_) => self.error("Too much code to jump over.", span),
        }
    }

    /// Emit a backwards jump to `loop_start`.
    pub(super) fn emit_loop(&mut self, loop_start: CodeOffset, span: Span) {
        // 3: length of the loop instruction plus its operand.
        let offset = self.current_chunk_len() - *loop_start + 3;
        self.emit(OpCode::Loop, span);
        match u16::try_from(offset) {
            Ok(offset) => self.emit_u16(offset, span),
            Err(_) => {
                self.error("Loop body too large.", span);
                self.emit_u16(0, span);
            }
        }
    }
}
